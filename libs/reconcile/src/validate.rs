//! Parameter validation.
//!
//! Decides, without I/O, whether a Run can be addressed by this reconciler.
//! Checks run in a fixed order and the first failure wins.

use std::fmt;

use crate::run::Run;

/// Name of the single accepted parameter.
pub const URL_PARAM: &str = "url";

/// The (apiVersion, kind) pair a Run must reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReference {
    pub api_version: String,
    pub kind: String,
}

impl Default for JobReference {
    fn default() -> Self {
        Self {
            api_version: "jenkins.tekton.dev/v0".to_string(),
            kind: "JenkinsJob".to_string(),
        }
    }
}

/// Why a Run was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingReference,
    UnexpectedReference,
    UnexpectedName,
    MissingUrl,
    UnexpectedParams,
}

impl RejectReason {
    /// Reason code recorded on the Run's condition.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingReference => "MissingReference",
            Self::UnexpectedReference => "UnexpectedReference",
            Self::UnexpectedName => "UnexpectedName",
            Self::MissingUrl => "MissingURL",
            Self::UnexpectedParams => "UnexpectedParams",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A terminal validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub message: String,
}

impl Rejection {
    fn new(reason: RejectReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Validate a Run and extract its job url.
pub fn validate<'a>(run: &'a Run, expected: &JobReference) -> Result<&'a str, Rejection> {
    let Some(reference) = run.spec.reference.as_ref() else {
        return Err(Rejection::new(
            RejectReason::MissingReference,
            "run has no ref",
        ));
    };

    if reference.api_version != expected.api_version || reference.kind != expected.kind {
        return Err(Rejection::new(
            RejectReason::UnexpectedReference,
            format!(
                "unexpected ref {}/{}, expected {}/{}",
                reference.api_version, reference.kind, expected.api_version, expected.kind
            ),
        ));
    }

    if !reference.name.is_empty() {
        return Err(Rejection::new(
            RejectReason::UnexpectedName,
            format!("unexpected ref name: {}", reference.name),
        ));
    }

    let url = match run.spec.param(URL_PARAM) {
        Some(p) if !p.value.is_empty() => p.value.as_str(),
        _ => {
            return Err(Rejection::new(
                RejectReason::MissingUrl,
                "url param was not passed",
            ))
        }
    };

    if run.spec.params.len() != 1 {
        // Everything except the first `url`, in encounter order.
        let mut seen_url = false;
        let offending: Vec<&str> = run
            .spec
            .params
            .iter()
            .filter(|p| {
                if p.name == URL_PARAM && !seen_url {
                    seen_url = true;
                    return false;
                }
                true
            })
            .map(|p| p.name.as_str())
            .collect();

        return Err(Rejection::new(
            RejectReason::UnexpectedParams,
            format!("unexpected params: [{}]", offending.join(" ")),
        ));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{Param, RunRef, RunSpec};
    use rstest::rstest;
    use runrelay_id::RunKey;

    fn run_with(reference: Option<RunRef>, params: Vec<Param>) -> Run {
        Run::new(
            RunKey::parse("default/r").unwrap(),
            RunSpec { reference, params },
        )
    }

    fn jenkins_ref(name: &str) -> Option<RunRef> {
        Some(RunRef {
            api_version: "jenkins.tekton.dev/v0".into(),
            kind: "JenkinsJob".into(),
            name: name.into(),
        })
    }

    #[test]
    fn test_accepts_single_url() {
        let run = run_with(jenkins_ref(""), vec![Param::new("url", "http://svc")]);
        assert_eq!(validate(&run, &JobReference::default()), Ok("http://svc"));
    }

    #[rstest]
    #[case::no_ref(None, vec![Param::new("url", "http://svc")], RejectReason::MissingReference)]
    #[case::wrong_kind(
        Some(RunRef { api_version: "jenkins.tekton.dev/v0".into(), kind: "Other".into(), name: String::new() }),
        vec![Param::new("url", "http://svc")],
        RejectReason::UnexpectedReference
    )]
    #[case::wrong_version(
        Some(RunRef { api_version: "v1".into(), kind: "JenkinsJob".into(), name: String::new() }),
        vec![Param::new("url", "http://svc")],
        RejectReason::UnexpectedReference
    )]
    #[case::named(jenkins_ref("foo"), vec![Param::new("url", "http://svc")], RejectReason::UnexpectedName)]
    #[case::no_params(jenkins_ref(""), vec![], RejectReason::MissingUrl)]
    #[case::empty_url(jenkins_ref(""), vec![Param::new("url", "")], RejectReason::MissingUrl)]
    #[case::no_url_extra(jenkins_ref(""), vec![Param::new("other", "x")], RejectReason::MissingUrl)]
    #[case::extra(
        jenkins_ref(""),
        vec![Param::new("url", "http://svc"), Param::new("other", "x")],
        RejectReason::UnexpectedParams
    )]
    fn test_rejections(
        #[case] reference: Option<RunRef>,
        #[case] params: Vec<Param>,
        #[case] expected: RejectReason,
    ) {
        let run = run_with(reference, params);
        let rejection = validate(&run, &JobReference::default()).unwrap_err();
        assert_eq!(rejection.reason, expected);
    }

    #[test]
    fn test_unexpected_name_message() {
        let run = run_with(jenkins_ref("foo"), vec![Param::new("url", "http://svc")]);
        let rejection = validate(&run, &JobReference::default()).unwrap_err();
        assert_eq!(rejection.reason.code(), "UnexpectedName");
        assert_eq!(rejection.message, "unexpected ref name: foo");
    }

    #[test]
    fn test_unexpected_params_lists_in_order() {
        let run = run_with(
            jenkins_ref(""),
            vec![
                Param::new("zeta", "1"),
                Param::new("url", "http://svc"),
                Param::new("alpha", "2"),
                Param::new("url", "http://dup"),
            ],
        );
        let rejection = validate(&run, &JobReference::default()).unwrap_err();
        assert_eq!(rejection.reason, RejectReason::UnexpectedParams);
        assert_eq!(rejection.message, "unexpected params: [zeta alpha url]");
    }

    #[test]
    fn test_custom_reference() {
        let expected = JobReference {
            api_version: "ci.example.dev/v1".into(),
            kind: "BuildJob".into(),
        };
        let run = run_with(
            Some(RunRef {
                api_version: "ci.example.dev/v1".into(),
                kind: "BuildJob".into(),
                name: String::new(),
            }),
            vec![Param::new("url", "http://svc")],
        );
        assert!(validate(&run, &expected).is_ok());
        assert!(validate(&run, &JobReference::default()).is_err());
    }
}
