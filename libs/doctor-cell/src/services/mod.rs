pub mod availability;
pub mod doctor;
pub mod integrity;

pub use availability::AvailabilityService;
pub use doctor::DoctorService;
pub use integrity::ReferenceIntegrityService;
