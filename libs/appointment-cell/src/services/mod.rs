pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod memory_store;
pub mod store;
pub mod supabase_store;

pub use booking::AppointmentBookingService;
pub use conflict::{intervals_overlap, ConflictQuery, TimeWindow, BLOCKING_STATUSES};
pub use memory_store::InMemoryAppointmentStore;
pub use store::AppointmentStore;
pub use supabase_store::SupabaseAppointmentStore;
