pub mod booking;
pub mod lifecycle;
pub mod notification;
pub mod slots;
