mod checkpoint_tests;
