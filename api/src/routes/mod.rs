pub mod health;
pub mod internal_user_input_requests;
pub mod user_input_requests;
