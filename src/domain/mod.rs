pub mod insights;
pub mod models;
pub mod question_bank;
pub mod scoring;
pub mod test_flow;
