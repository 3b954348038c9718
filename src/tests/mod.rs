// Test modules

pub mod common;

mod advisor_pipeline_test;
mod query_scenarios_test;
