use stationlend_auth::Presentation;

/// What the caller presented in request headers.
///
/// Present on every tenant-scoped request; an anonymous caller simply
/// presents nothing. Credentials sent in a JSON body take precedence.
#[derive(Clone, Default)]
pub struct CallerContext {
    presented: Presentation,
}

impl CallerContext {
    pub fn new(presented: Presentation) -> Self {
        Self { presented }
    }

    pub fn presented(&self) -> &Presentation {
        &self.presented
    }

    /// Combine with credentials from a request body.
    pub fn with_body(&self, body: Presentation) -> Presentation {
        Presentation {
            credential: body.credential.or_else(|| self.presented.credential.clone()),
            access_code: body.access_code.or_else(|| self.presented.access_code.clone()),
        }
    }
}

/// Marker inserted once the admin token was verified.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AdminContext;
