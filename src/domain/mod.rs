pub mod catalog;
pub mod booking;
pub mod payment;
pub mod notification;

pub use catalog::*;
pub use booking::*;
pub use payment::*;
pub use notification::*;
