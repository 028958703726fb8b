mod appointment_type;
mod booking;
mod calendar_link;
mod instructor;
mod manual_block;
mod weekly_template;

pub use appointment_type::*;
pub use booking::*;
pub use calendar_link::*;
pub use instructor::*;
pub use manual_block::*;
pub use weekly_template::*;
