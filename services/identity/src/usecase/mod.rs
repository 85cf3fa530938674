pub mod account;
pub mod invitation;
pub mod maintenance;
pub mod password;
pub mod permission;
pub mod secret;
pub mod token;
