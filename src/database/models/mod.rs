pub mod community;
pub mod landlord;
pub mod organization;
pub mod user;
