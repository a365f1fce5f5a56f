// Copyright 2024 Oxide Computer Company

//! Authentication and authorization for protected routes

mod constraint;
mod identity;
mod protected;
mod provider;
mod session;

pub use constraint::AuthConstraint;
pub use identity::Identity;
pub use identity::Roles;
pub use identity::Token;
pub use identity::User;
pub use protected::AuthProviders;
pub use protected::ProtectedResource;
pub use provider::AuthProviderError;
pub use provider::AuthenticationProvider;
pub use provider::AuthorizationProvider;
pub use session::MemorySession;
pub use session::Session;
pub use session::SessionBackedAuthentication;
pub use session::SessionBackedAuthorization;
