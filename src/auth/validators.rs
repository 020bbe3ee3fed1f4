use crate::auth::dto::{LoginPayload, LoginRequest, RegisterPayload, RegisterRequest};
use crate::validation::{email_field, string_field, ValidationErrors};

pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 128;

pub fn validate_register(req: &RegisterRequest) -> Result<RegisterPayload, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let username = string_field(&mut errors, "username", req.username.as_deref(), 1, 255);
    let email = email_field(&mut errors, "email", req.email.as_deref());
    let password = string_field(
        &mut errors,
        "password",
        req.password.as_deref(),
        PASSWORD_MIN,
        PASSWORD_MAX,
    );
    match (username, email, password) {
        (Some(username), Some(email), Some(password)) => errors.finish(RegisterPayload {
            username,
            email,
            password,
        }),
        _ => Err(errors),
    }
}

pub fn validate_login(req: &LoginRequest) -> Result<LoginPayload, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let email = email_field(&mut errors, "email", req.email.as_deref());
    let password = string_field(&mut errors, "password", req.password.as_deref(), 1, PASSWORD_MAX);
    match (email, password) {
        (Some(email), Some(password)) => errors.finish(LoginPayload { email, password }),
        _ => Err(errors),
    }
}
