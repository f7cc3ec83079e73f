use std::fmt::Write as _;

/// Value of the `robots` meta tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotsDirective {
    pub index: bool,
    pub follow: bool,
}

impl RobotsDirective {
    pub const PUBLIC: Self = Self {
        index: true,
        follow: true,
    };
    pub const PRIVATE: Self = Self {
        index: false,
        follow: false,
    };

    pub fn as_content(self) -> &'static str {
        match (self.index, self.follow) {
            (true, true) => "index, follow",
            (true, false) => "index, nofollow",
            (false, true) => "noindex, follow",
            (false, false) => "noindex, nofollow",
        }
    }
}

/// Static `<head>` metadata for a rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMetadata {
    pub title: &'static str,
    pub description: &'static str,
    pub robots: RobotsDirective,
}

impl PageMetadata {
    pub const fn sign_in() -> Self {
        Self {
            title: "Sign in",
            description: "Sign in to your workspace",
            robots: RobotsDirective::PRIVATE,
        }
    }

    pub const fn auth_error() -> Self {
        Self {
            title: "Authentication error",
            description: "Something went wrong while signing in",
            robots: RobotsDirective::PRIVATE,
        }
    }

    /// Renders the `<head>` element contents.
    pub fn render_head(&self) -> String {
        let mut head = String::new();
        head.push_str("<meta charset=\"utf-8\">");
        head.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">");
        let _ = write!(head, "<title>{}</title>", escape_html(self.title));
        let _ = write!(
            head,
            "<meta name=\"description\" content=\"{}\">",
            escape_html(self.description)
        );
        let _ = write!(
            head,
            "<meta name=\"robots\" content=\"{}\">",
            self.robots.as_content()
        );
        head
    }
}

/// Error codes the sign-in flow redirects to the error page with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    Configuration,
    AccessDenied,
    Verification,
    Default,
}

impl AuthErrorKind {
    /// Parses the `error` query parameter. Unknown and missing codes fall
    /// back to [`AuthErrorKind::Default`].
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("Configuration") => Self::Configuration,
            Some("AccessDenied") => Self::AccessDenied,
            Some("Verification") => Self::Verification,
            _ => Self::Default,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Configuration => "Configuration",
            Self::AccessDenied => "AccessDenied",
            Self::Verification => "Verification",
            Self::Default => "Default",
        }
    }

    /// HTTP status the error page is served with.
    pub fn status_code(self) -> u16 {
        match self {
            Self::Configuration => 500,
            Self::AccessDenied | Self::Verification => 403,
            Self::Default => 200,
        }
    }

    pub fn heading(self) -> &'static str {
        match self {
            Self::Configuration => "Server error",
            Self::AccessDenied => "Access denied",
            Self::Verification => "Unable to sign in",
            Self::Default => "Error",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Configuration => {
                "There is a problem with the server configuration. Check the server logs for more information."
            }
            Self::AccessDenied => "You do not have permission to sign in.",
            Self::Verification => {
                "The sign in link is no longer valid. It may have been used already or it may have expired."
            }
            Self::Default => "An unexpected error occurred while signing in.",
        }
    }
}

/// Escapes text for inclusion in HTML element content and quoted attributes.
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}
