mod config_test;
mod run_test;
mod topics_test;
