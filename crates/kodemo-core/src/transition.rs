//! Which code version to show, and how to get there.

use crate::document::Subject;
use crate::effect::Effect;
use kodemo_diff::{CodeDiff, diff_code};

/// How a code subject reacts to a change of the current effect.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeTransition {
    /// The subject is not affected.
    None,
    /// Show `version_id` without animating.
    Instant {
        /// Version to show.
        version_id: String,
    },
    /// Animate from one version to another.
    Animated {
        /// Version shown so far.
        from_version: String,
        /// Version to show.
        to_version: String,
        /// Line pairing between the two.
        diff: CodeDiff,
    },
}

/// Plan the transition of code subject `subject_id` when the current effect changes from
/// `previous` to `current`.
///
/// Nothing happens unless `current` targets this subject and differs from `previous`. The
/// change animates when both effects resolve to non-empty versions of this subject, and is
/// instant otherwise.
pub fn plan_code_transition(
    subject_id: &str,
    subject: &Subject,
    previous: Option<&Effect>,
    current: Option<&Effect>,
) -> CodeTransition {
    let Some(current) = current.filter(|effect| effect.subject.as_deref() == Some(subject_id))
    else {
        return CodeTransition::None;
    };
    if previous.is_some_and(|previous| previous.id == current.id) {
        return CodeTransition::None;
    }

    if let Some((from_version, from_content)) = previous.and_then(|p| version_content(subject, p))
        && let Some((to_version, to_content)) = version_content(subject, current)
    {
        tracing::trace!(subject_id, from_version, to_version, "animating code transition");
        return CodeTransition::Animated {
            from_version: from_version.to_string(),
            to_version: to_version.to_string(),
            diff: diff_code(from_content, to_content),
        };
    }

    match &current.version {
        Some(version_id) => CodeTransition::Instant {
            version_id: version_id.clone(),
        },
        None => CodeTransition::None,
    }
}

/// Version id and content `effect` shows, if the version exists and is not empty.
fn version_content<'a>(subject: &'a Subject, effect: &'a Effect) -> Option<(&'a str, &'a str)> {
    let version_id = effect.version.as_deref()?;
    let version = subject.version(version_id)?;
    (!version.value.is_empty()).then_some((version_id, version.value.as_str()))
}

/// Whether `version_id` of `subject_id` is the version `effect` shows.
///
/// When the effect names a version this subject does not have, the first version is shown.
pub fn is_version_active(
    subject: &Subject,
    effect: Option<&Effect>,
    subject_id: &str,
    version_id: &str,
) -> bool {
    let Some(effect) = effect.filter(|effect| effect.subject.as_deref() == Some(subject_id)) else {
        return false;
    };

    match effect.version.as_deref() {
        Some(active) if subject.versions.contains_key(active) => active == version_id,
        _ => subject.first_version_id() == Some(version_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Version;
    use kodemo_config::SubjectType;

    fn subject() -> Subject {
        let mut subject = Subject::new(SubjectType::Code, "main.js");
        subject.versions.insert("v1".into(), Version::new("a\nb"));
        subject.versions.insert("v2".into(), Version::new("a\nb\nc"));
        subject.versions.insert("empty".into(), Version::new(""));
        subject.version_index = vec!["v1".into(), "v2".into(), "empty".into()];
        subject
    }

    fn effect(id: &str, version: &str) -> Effect {
        Effect::new().with_id(id).with_subject("s").with_version(version)
    }

    #[test]
    fn test_animated_between_versions() {
        let subject = subject();
        let from = effect("e1", "v1");
        let to = effect("e2", "v2");
        match plan_code_transition("s", &subject, Some(&from), Some(&to)) {
            CodeTransition::Animated { from_version, to_version, diff } => {
                assert_eq!((from_version.as_str(), to_version.as_str()), ("v1", "v2"));
                assert_eq!(diff.added_lines.iter().copied().collect::<Vec<_>>(), vec![3]);
            }
            other => panic!("expected an animated transition, got {other:?}"),
        }
    }

    #[test]
    fn test_instant_and_noop_cases() {
        let subject = subject();
        let to = effect("e2", "v2");

        assert_eq!(
            plan_code_transition("s", &subject, None, Some(&to)),
            CodeTransition::Instant { version_id: "v2".into() }
        );
        assert_eq!(
            plan_code_transition("s", &subject, Some(&effect("e1", "empty")), Some(&to)),
            CodeTransition::Instant { version_id: "v2".into() }
        );
        assert_eq!(
            plan_code_transition("s", &subject, Some(&to), Some(&to)),
            CodeTransition::None
        );
        assert_eq!(
            plan_code_transition("other", &subject, None, Some(&to)),
            CodeTransition::None
        );
    }

    #[test]
    fn test_version_active_falls_back_to_first() {
        let subject = subject();
        let effect = effect("e", "missing");
        assert!(is_version_active(&subject, Some(&effect), "s", "v1"));
        assert!(!is_version_active(&subject, Some(&effect), "s", "v2"));
        assert!(!is_version_active(&subject, None, "s", "v1"));
    }
}
