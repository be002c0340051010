use crate::error::TrackerError;

/// Platform permission state for location access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Prompt,
    Denied,
    /// Platform cannot report permission state; treated as usable.
    Unknown,
}

/// Boolean preconditions probed before a session may start. Implemented by
/// the embedder for whatever host the pipeline runs in.
pub trait Environment: Send + Sync {
    /// Page/app is served over a secure transport.
    fn secure_transport(&self) -> bool;

    /// Local development host, exempt from the secure-transport rule.
    fn local_development(&self) -> bool {
        false
    }

    /// A position stream is available at all.
    fn location_capability(&self) -> bool;

    /// Running inside a restrictive embedded browser.
    fn embedded_browser(&self) -> bool {
        false
    }

    fn permission_state(&self) -> PermissionState {
        PermissionState::Unknown
    }

    /// Device connectivity at probe time.
    fn online(&self) -> bool {
        true
    }
}

/// Check every start precondition, reporting the first specific failure.
pub fn check_environment(env: &dyn Environment) -> Result<(), TrackerError> {
    if !env.local_development() && !env.secure_transport() {
        return Err(TrackerError::InsecureContext);
    }
    if !env.location_capability() {
        return Err(TrackerError::NoGeolocation);
    }
    if env.embedded_browser() {
        return Err(TrackerError::EmbeddedBrowser);
    }
    if env.permission_state() == PermissionState::Denied {
        return Err(TrackerError::PermissionDenied);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        secure: bool,
        local: bool,
        capability: bool,
        embedded: bool,
        permission: PermissionState,
    }

    impl Default for Probe {
        fn default() -> Self {
            Probe {
                secure: true,
                local: false,
                capability: true,
                embedded: false,
                permission: PermissionState::Granted,
            }
        }
    }

    impl Environment for Probe {
        fn secure_transport(&self) -> bool {
            self.secure
        }

        fn local_development(&self) -> bool {
            self.local
        }

        fn location_capability(&self) -> bool {
            self.capability
        }

        fn embedded_browser(&self) -> bool {
            self.embedded
        }

        fn permission_state(&self) -> PermissionState {
            self.permission
        }
    }

    #[test]
    fn test_all_probes_pass() {
        assert!(check_environment(&Probe::default()).is_ok());
    }

    #[test]
    fn test_insecure_transport_fails_unless_local() {
        let probe = Probe {
            secure: false,
            ..Probe::default()
        };
        assert!(matches!(
            check_environment(&probe),
            Err(TrackerError::InsecureContext)
        ));

        let local = Probe {
            secure: false,
            local: true,
            ..Probe::default()
        };
        assert!(check_environment(&local).is_ok());
    }

    #[test]
    fn test_specific_failures_reported() {
        let no_capability = Probe {
            capability: false,
            ..Probe::default()
        };
        assert!(matches!(
            check_environment(&no_capability),
            Err(TrackerError::NoGeolocation)
        ));

        let embedded = Probe {
            embedded: true,
            ..Probe::default()
        };
        assert!(matches!(
            check_environment(&embedded),
            Err(TrackerError::EmbeddedBrowser)
        ));

        let denied = Probe {
            permission: PermissionState::Denied,
            ..Probe::default()
        };
        assert!(matches!(
            check_environment(&denied),
            Err(TrackerError::PermissionDenied)
        ));
    }

    #[test]
    fn test_unknown_permission_is_usable() {
        let unknown = Probe {
            permission: PermissionState::Unknown,
            ..Probe::default()
        };
        assert!(check_environment(&unknown).is_ok());
    }
}
