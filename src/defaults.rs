/*!
 * Default fields
 *
 * Fields merged into every record the process appends: the operating system
 * always, and the developer's identity when their email belongs to the
 * configured domain.
 */

use devtel_core_store::Fields;
use std::path::PathBuf;
use std::process::Command;
use sysinfo::System;
use tracing::debug;

/// Decides whether developer identity is attached to records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityPolicy {
    /// Email suffix that enables identity, e.g. `@example.com`
    pub domain: Option<String>,
}

impl IdentityPolicy {
    pub fn new(domain: Option<String>) -> Self {
        Self {
            domain: domain.filter(|d| !d.is_empty()),
        }
    }

    /// Never attach identity
    pub fn disabled() -> Self {
        Self { domain: None }
    }

    pub fn allows(&self, email: &str) -> bool {
        match self.domain.as_deref() {
            Some(domain) => !email.is_empty() && email.ends_with(domain),
            None => false,
        }
    }
}

/// Source of host facts
pub trait HostProbe {
    /// Developer email, if one can be found
    fn email(&self) -> Option<String>;

    fn user(&self) -> Option<String>;

    fn hostname(&self) -> Option<String>;

    fn work_dir(&self) -> Option<PathBuf>;
}

/// Reads host facts from the running system
///
/// The email comes from `DEV_EMAIL`, falling back to `git config user.email`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn email(&self) -> Option<String> {
        if let Some(email) = std::env::var("DEV_EMAIL").ok().filter(|e| !e.is_empty()) {
            return Some(email);
        }

        let output = Command::new("git")
            .args(["config", "user.email"])
            .output()
            .ok()?;
        if !output.status.success() {
            debug!("git config user.email exited with {}", output.status);
            return None;
        }
        let email = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!email.is_empty()).then_some(email)
    }

    fn user(&self) -> Option<String> {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok()
            .filter(|u| !u.is_empty())
    }

    fn hostname(&self) -> Option<String> {
        System::host_name()
    }

    fn work_dir(&self) -> Option<PathBuf> {
        std::env::current_dir().ok()
    }
}

/// Collect default fields from the running system
pub fn collect_default_fields(policy: &IdentityPolicy) -> Fields {
    collect_default_fields_with(policy, &SystemProbe)
}

/// Collect default fields from `probe`
///
/// The probe is only asked for identity when a domain is configured.
pub fn collect_default_fields_with<P: HostProbe + ?Sized>(
    policy: &IdentityPolicy,
    probe: &P,
) -> Fields {
    let mut fields = Fields::new()
        .with("os.name", std::env::consts::OS)
        .with("os.arch", std::env::consts::ARCH);

    if policy.domain.is_none() {
        return fields;
    }

    let Some(email) = probe.email().filter(|email| policy.allows(email)) else {
        debug!("Developer identity not collected");
        return fields;
    };

    fields.add("dev.email", email);
    if let Some(user) = probe.user() {
        fields.add("os.user", user);
    }
    if let Some(hostname) = probe.hostname() {
        fields.add("os.hostname", hostname);
    }
    if let Some(dir) = probe.work_dir() {
        fields.add("os.workDir", dir.display().to_string());
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[derive(Default)]
    struct FakeProbe {
        email: Option<String>,
        asked: Cell<bool>,
    }

    impl HostProbe for FakeProbe {
        fn email(&self) -> Option<String> {
            self.asked.set(true);
            self.email.clone()
        }

        fn user(&self) -> Option<String> {
            Some("dev".to_string())
        }

        fn hostname(&self) -> Option<String> {
            Some("laptop".to_string())
        }

        fn work_dir(&self) -> Option<PathBuf> {
            Some(PathBuf::from("/src/app"))
        }
    }

    fn probe(email: &str) -> FakeProbe {
        FakeProbe {
            email: Some(email.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_os_fields_always_present() {
        let fields = collect_default_fields_with(&IdentityPolicy::disabled(), &probe("a@b.c"));
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("os.name"), Some(&json!(std::env::consts::OS)));
        assert_eq!(fields.get("os.arch"), Some(&json!(std::env::consts::ARCH)));
    }

    #[test]
    fn test_no_domain_never_probes_identity() {
        let fake = probe("dev@example.com");
        collect_default_fields_with(&IdentityPolicy::new(None), &fake);
        assert!(!fake.asked.get());
    }

    #[test]
    fn test_matching_domain_adds_identity() {
        let policy = IdentityPolicy::new(Some("@example.com".to_string()));
        let fields = collect_default_fields_with(&policy, &probe("dev@example.com"));

        assert_eq!(fields.get("dev.email"), Some(&json!("dev@example.com")));
        assert_eq!(fields.get("os.user"), Some(&json!("dev")));
        assert_eq!(fields.get("os.hostname"), Some(&json!("laptop")));
        assert_eq!(fields.get("os.workDir"), Some(&json!("/src/app")));
    }

    #[test]
    fn test_foreign_domain_is_ignored() {
        let policy = IdentityPolicy::new(Some("@example.com".to_string()));
        let fields = collect_default_fields_with(&policy, &probe("dev@elsewhere.org"));
        assert!(fields.get("dev.email").is_none());
        assert!(fields.get("os.user").is_none());
    }

    #[test]
    fn test_missing_email_is_ignored() {
        let policy = IdentityPolicy::new(Some("@example.com".to_string()));
        let fields = collect_default_fields_with(&policy, &FakeProbe::default());
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_policy_allows() {
        let policy = IdentityPolicy::new(Some("@example.com".to_string()));
        assert!(policy.allows("a@example.com"));
        assert!(!policy.allows("a@example.com.evil"));
        assert!(!policy.allows(""));
        assert_eq!(IdentityPolicy::new(Some(String::new())), IdentityPolicy::disabled());
    }
}
