mod request;
mod token;

pub use request::{
    AuthResponse, LoginRequest, ProfileRequest, ProfileResponse, RegisterRequest, UpdatedFields,
    VoterView, MIN_PASSWORD_LENGTH,
};
pub use token::{AuthToken, AUTH_TOKEN_COOKIE};
