mod availability_repository;
mod booking_repository;
mod calendar_repository;
mod instructor_repository;

pub use availability_repository::{PgManualBlockStore, PgTemplateStore};
pub use booking_repository::PgBookingLedger;
pub use calendar_repository::{PgBusyCacheStore, PgCalendarLinkStore};
pub use instructor_repository::{PgAppointmentTypeStore, PgInstructorStore};
