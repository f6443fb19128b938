//! Logical names of the tables and columns the tools touch

/// Speakers are stored as contacts
pub mod contact {
    pub const ENTITY: &str = "contact";
    pub const FIRST_NAME: &str = "firstname";
    pub const LAST_NAME: &str = "lastname";
    pub const BIOGRAPHY: &str = "cr5ec_biography";
}

/// Custom event table
pub mod event {
    pub const ENTITY: &str = "new_event";
    pub const NAME: &str = "cr5ec_eventname";
    pub const LOCATION: &str = "new_location";
    pub const DATE: &str = "cr5ec_eventdate";
    /// Many-to-many between events and their speaking contacts
    pub const SPEAKERS_RELATIONSHIP: &str = "cr5ec_new_EventSpeakers";
}
