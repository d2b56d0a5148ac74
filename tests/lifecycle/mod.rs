mod teardown_test;
