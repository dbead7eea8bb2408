mod handler;
mod model;

pub use handler::{
    change_password,
    deactivate,
    login,
    logout,
    me,
    refresh_token,
    register,
    reset_password,
    social_login,
    update_nickname,
};
pub use model::Member;
