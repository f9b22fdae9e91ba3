use proptest::prelude::*;
use sdk::errors::{AssayErrorExt, EngineError};
use sdk::types::AgentKind;

// Error user hints never echo caller-supplied text, which may carry payload data.
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*") {
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::AgentNotFound(error_str.clone()),
            EngineError::WorkflowNotFound(error_str.clone()),
            EngineError::Validation(error_str.clone()),
            EngineError::Judge(error_str.clone()),
            EngineError::Embedding(error_str.clone()),
            EngineError::HitlHandler(error_str.clone()),
            EngineError::PermissionDenied(error_str.clone()),
            EngineError::UnsupportedTask { agent: error_str.clone(), task: error_str.clone() },
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            if error_str.chars().count() > 24 {
                prop_assert!(!hint.contains(error_str.as_str()));
            }
        }
    }
}

// Agent keys survive conversion to and from their string form.
proptest! {
    #[test]
    fn test_agent_kind_key_stability(name in "[a-z][a-z_]{0,20}") {
        let kind = AgentKind::from(name.as_str());
        prop_assert_eq!(kind.as_str(), name.as_str());

        let back: String = kind.clone().into();
        prop_assert_eq!(AgentKind::from(back), kind);
    }
}
