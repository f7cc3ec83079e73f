pub mod client;

pub use client::{
    AuthorizeUrlParams, OAuthClient, OAuthError, ProviderEndpoints, TokenResponse, UserInfo,
};
