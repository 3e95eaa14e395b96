pub mod attendee;
pub mod db;
pub mod emails;
pub mod event;
pub mod interest;
pub mod roster;
pub mod service;
