mod guard;
mod handler;
mod model;

pub use guard::{Capability, require_attendee, require_author, require_capability};
pub use handler::{
    add_attendee,
    create_schedule,
    delete_schedule,
    get_schedule,
    leave_schedule,
    list_attendees,
    list_schedules,
    remove_attendee,
    replace_routes,
    update_permission,
    update_schedule,
};
pub use model::{AttendeePermission, AttendeeRole, TravelAttendee, TravelSchedule};
