/*!
 * Hook matching
 *
 * Maps a "closing" lifecycle hook (`after:deploy`, `error:deploy`, ...) to the
 * "opening" hook it pairs with (`before:deploy`). Matching is by prefix, so
 * sub-scoped hooks such as `after:deploy:app` resolve to `before:deploy:app`.
 */

/// Lifecycle groups of the command runner
///
/// Position 0 of each group is the opening hook; every later position is a
/// closing hook for it. The first matching group wins, so ordering matters
/// when prefixes overlap.
pub const HOOK_GROUPS: &[&[&str]] = &[
    &["before:build", "after:build", "error:build"],
    &["before:deploy", "after:deploy"],
    &["before:deploy", "after:deploy", "error:deploy", "skip:deploy"],
    &["before:render", "after:render"],
    &["before:render", "after:render", "error:render"],
    &["before:purge", "after:purge"],
    &["before:purge", "after:purge", "error:purge"],
    &["before:resolveDependency", "after:resolveDependency", "error:resolveDependency"],
    &["before:buildDependency", "after:buildDependency", "error:buildDependency"],
    &["before:deployDependency", "after:deployDependency", "error:deployDependency"],
    &["before:renderDependency", "after:renderDependency", "error:renderDependency"],
    &["before:purgeDependency", "after:purgeDependency", "error:purgeDependency"],
    &["before:configLoad", "after:configLoad", "error:configLoad"],
    &["start:sync", "stop:sync", "error:sync", "restart:sync"],
    &["before:initialSync", "after:initialSync", "error:initialSync"],
    &["start:portForwarding", "error:portForwarding", "stop:portForwarding"],
    &[
        "start:reversePortForwarding",
        "error:reversePortForwarding",
        "stop:reversePortForwarding",
    ],
    &["before:createPullSecrets", "after:createPullSecrets", "error:createPullSecrets"],
    &["devCommand:before:sync", "devCommand:after:sync"],
    &["devCommand:before:portForwarding", "devCommand:after:portForwarding"],
    &["devCommand:before:replacePods", "devCommand:after:replacePods"],
    &["devCommand:before:runPipeline", "devCommand:after:runPipeline"],
    &["devCommand:before:deployDependencies", "devCommand:after:deployDependencies"],
    &["devCommand:before:build", "devCommand:after:build"],
    &["devCommand:before:deploy", "devCommand:after:deploy"],
    &[
        "devCommand:before:execute",
        "devCommand:after:execute",
        "devCommand:interrupt",
        "devCommand:error",
    ],
    &[
        "deployCommand:before:execute",
        "deployCommand:after:execute",
        "deployCommand:error",
        "deployCommand:interrupt",
    ],
    &[
        "purgeCommand:before:execute",
        "purgeCommand:after:execute",
        "purgeCommand:error",
        "purgeCommand:interrupt",
    ],
    &[
        "buildCommand:before:execute",
        "buildCommand:after:execute",
        "buildCommand:error",
        "buildCommand:interrupt",
    ],
    &["command:before:execute", "command:after:execute", "command:error"],
];

/// Resolve the opening hook for `hook` using [`HOOK_GROUPS`]
///
/// Returns `None` for opening hooks and for hooks with no known opener.
pub fn opening_hook(hook: &str) -> Option<String> {
    resolve(HOOK_GROUPS, hook)
}

fn resolve<G: AsRef<[S]>, S: AsRef<str>>(groups: &[G], hook: &str) -> Option<String> {
    for group in groups {
        let group = group.as_ref();
        let Some((opening, closing)) = group.split_first() else {
            continue;
        };
        for name in closing {
            if let Some(suffix) = hook.strip_prefix(name.as_ref()) {
                return Some(format!("{}{}", opening.as_ref(), suffix));
            }
        }
    }
    None
}

/// Hook matcher over a caller-supplied group table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookMatcher {
    groups: Vec<Vec<String>>,
}

impl HookMatcher {
    /// Build a matcher from groups ordered most specific first
    pub fn new<G, S>(groups: impl IntoIterator<Item = G>) -> Self
    where
        G: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: groups
                .into_iter()
                .map(|group| group.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    pub fn opening_hook(&self, hook: &str) -> Option<String> {
        resolve(&self.groups, hook)
    }

    /// True when `hook` is the opening position of some group
    pub fn is_opening(&self, hook: &str) -> bool {
        self.groups
            .iter()
            .any(|group| group.first().is_some_and(|opening| opening == hook))
    }

    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }
}

impl Default for HookMatcher {
    fn default() -> Self {
        Self::new(HOOK_GROUPS.iter().map(|group| group.iter().copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closing_hooks_resolve() {
        assert_eq!(opening_hook("after:deploy").as_deref(), Some("before:deploy"));
        assert_eq!(opening_hook("error:deploy").as_deref(), Some("before:deploy"));
        assert_eq!(opening_hook("skip:deploy").as_deref(), Some("before:deploy"));
        assert_eq!(opening_hook("restart:sync").as_deref(), Some("start:sync"));
        assert_eq!(
            opening_hook("stop:portForwarding").as_deref(),
            Some("start:portForwarding")
        );
        assert_eq!(
            opening_hook("devCommand:interrupt").as_deref(),
            Some("devCommand:before:execute")
        );
    }

    #[test]
    fn test_opening_hooks_do_not_resolve() {
        assert_eq!(opening_hook("before:deploy"), None);
        assert_eq!(opening_hook("start:sync"), None);
        assert_eq!(opening_hook("command:before:execute"), None);
    }

    #[test]
    fn test_unknown_hooks_do_not_resolve() {
        assert_eq!(opening_hook("after:unknown"), None);
        assert_eq!(opening_hook(""), None);
    }

    #[test]
    fn test_sub_scoped_hook_keeps_suffix() {
        assert_eq!(
            opening_hook("after:deploy:app").as_deref(),
            Some("before:deploy:app")
        );
        assert_eq!(
            opening_hook("error:build:api:v2").as_deref(),
            Some("before:build:api:v2")
        );
    }

    #[test]
    fn test_prefix_not_equality() {
        // "after:build" also prefixes "after:buildDependency" but the
        // earlier group wins, keeping the remainder as a suffix
        assert_eq!(
            opening_hook("after:buildDependency").as_deref(),
            Some("before:buildDependency")
        );
    }

    #[test]
    fn test_first_matching_group_wins() {
        let matcher = HookMatcher::new(vec![
            vec!["begin:x", "end:x"],
            vec!["other:x", "end:x"],
        ]);
        assert_eq!(matcher.opening_hook("end:x").as_deref(), Some("begin:x"));
    }

    #[test]
    fn test_default_matcher_uses_builtin_table() {
        let matcher = HookMatcher::default();
        assert_eq!(matcher.groups().len(), HOOK_GROUPS.len());
        assert_eq!(
            matcher.opening_hook("after:render").as_deref(),
            Some("before:render")
        );
        assert!(matcher.is_opening("before:render"));
        assert!(!matcher.is_opening("after:render"));
    }

    #[test]
    fn test_single_name_group_never_matches() {
        let matcher = HookMatcher::new(vec![vec!["lonely"], vec![]]);
        assert_eq!(matcher.opening_hook("lonely"), None);
    }
}
