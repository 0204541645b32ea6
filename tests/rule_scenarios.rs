//! End-to-end access decision scenarios

use access_rules::core::parser::parse_date;
use access_rules::{
    canonical_string, AccessConfig, AccessCoordinator, AccessError, Address, EvaluationContext,
    InMemoryRuleStore, ParseError, Predicate, Principal, RuleDocument, RuleNode, RuleParser,
    SessionContext,
};
use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;

fn roles(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_editor_or_alice_rule() {
    let rule = RuleParser::parse("group editor or user alice").unwrap();
    let now = Utc::now();

    let editor_roles = roles(&["editor"]);
    let bob = EvaluationContext::new("bob", &editor_roles, now, None);
    assert!(rule.evaluate(&bob));

    let no_roles = roles(&[]);
    let carol = EvaluationContext::new("carol", &no_roles, now, None);
    assert!(!rule.evaluate(&carol));
}

#[test]
fn test_date_boundaries_are_shifted() {
    assert_eq!(
        RuleParser::parse("date <= 2020-01-01").unwrap(),
        Predicate::DateBefore(parse_date("2020-01-02").unwrap())
    );
    assert_eq!(
        RuleParser::parse("date >= 2020-01-01").unwrap(),
        Predicate::DateAfter(parse_date("2019-12-31").unwrap())
    );

    let no_roles = roles(&[]);
    let rule = RuleParser::parse("date <= 2020-01-01").unwrap();
    let new_year_evening = Utc.with_ymd_and_hms(2020, 1, 1, 23, 0, 0).unwrap();
    let next_morning = Utc.with_ymd_and_hms(2020, 1, 2, 1, 0, 0).unwrap();
    assert!(rule.evaluate(&EvaluationContext::new("x", &no_roles, new_year_evening, None)));
    assert!(!rule.evaluate(&EvaluationContext::new("x", &no_roles, next_morning, None)));
}

#[test]
fn test_structured_and_compact_rules_share_storage() {
    let store = Arc::new(InMemoryRuleStore::new());
    let access = AccessCoordinator::builder()
        .store(store.clone())
        .build()
        .unwrap();

    let json = r#"{
        "nodes": [
            { "kind": "boolean", "operator": "and", "children": [
                { "kind": "condition", "field": "ip", "operator": "=", "value": "10.0.0.0/8" },
                { "kind": "condition", "field": "group", "operator": "=", "value": "staff" }
            ]}
        ]
    }"#;
    let tree_id = access
        .add_rule(Some("report"), "read", RuleDocument::from_json(json).unwrap(), "", None)
        .unwrap();
    let text_id = access
        .add_rule(Some("memo"), "read", "group staff and ip 10.0.0.0/255.0.0.0", "", None)
        .unwrap();

    assert_eq!(tree_id, text_id);
    assert_eq!(store.rule_count(), 1);
    assert_eq!(
        access.rule_for(Some("memo"), "read").unwrap().unwrap().expression,
        "group staff and ip 10.0.0.0/255.0.0.0"
    );

    let office = access.sessions().open(
        Principal::new("erin", ["staff"]),
        Some(Address::parse("10.9.8.7").unwrap()),
    );
    let home = access.sessions().open(
        Principal::new("erin", ["staff"]),
        Some(Address::parse("84.1.2.3").unwrap()),
    );
    assert!(access.check_permission(office.as_ref(), Some("report"), "read").unwrap());
    assert!(!access.check_permission(home.as_ref(), Some("report"), "read").unwrap());
}

#[test]
fn test_empty_rule_denies() {
    assert_eq!(canonical_string(&RuleDocument::empty()).unwrap(), "false");

    let access = AccessCoordinator::builder().build().unwrap();
    access
        .add_rule(Some("locked"), "read", RuleDocument::empty(), "", None)
        .unwrap();
    let admin = access
        .sessions()
        .open(Principal::new("administrator", Vec::<String>::new()), None);
    assert!(!access.check_permission(admin.as_ref(), Some("locked"), "read").unwrap());
}

#[test]
fn test_configured_super_user() {
    let config = AccessConfig::from_toml_str("super_user = \"root\"").unwrap();
    let access = AccessCoordinator::builder().config(config).build().unwrap();

    let root = access.sessions().open(Principal::new("root", Vec::<String>::new()), None);
    let admin = access
        .sessions()
        .open(Principal::new("administrator", Vec::<String>::new()), None);

    assert!(access.check_permission(root.as_ref(), Some("doc"), "read").unwrap());
    assert!(!access.check_permission(admin.as_ref(), Some("doc"), "read").unwrap());
}

#[test]
fn test_a_priori_permissions_are_separate_from_objects() {
    let access = AccessCoordinator::builder().build().unwrap();
    access.add_rule(None, "create-doc", "group author", "", None).unwrap();

    let author = access.sessions().open(Principal::new("dana", ["author"]), None);
    assert!(access.check_a_priori(author.as_ref(), "create-doc").unwrap());
    // Same permission name on an object has no rule
    assert!(!access.check_permission(author.as_ref(), Some("doc"), "create-doc").unwrap());

    assert_eq!(access.remove_all_rules(None).unwrap(), 1);
    assert!(!access.check_a_priori(author.as_ref(), "create-doc").unwrap());
}

#[test]
fn test_authoring_errors_surface() {
    let access = AccessCoordinator::builder().build().unwrap();

    let err = access
        .add_rule(Some("doc"), "read", "ip 10.0.0.300", "", None)
        .unwrap_err();
    assert!(matches!(
        err,
        AccessError::Parse(ParseError::UnresolvedAddress(ref text)) if text == "10.0.0.300"
    ));

    let bad_field = RuleNode::condition("role", "=", "x");
    assert!(matches!(
        access.add_rule(Some("doc"), "read", bad_field, "", None),
        Err(AccessError::Parse(ParseError::UnknownField(_)))
    ));

    assert!(!access.has_any_rule(Some("doc")).unwrap());
}

#[test]
fn test_store_outage_propagates() {
    let store = Arc::new(InMemoryRuleStore::new());
    let access = AccessCoordinator::builder()
        .store(store.clone())
        .build()
        .unwrap();
    let session = access.sessions().open(Principal::guest(), None);

    store.set_available(false);
    assert!(matches!(
        access.check_permission(session.as_ref(), Some("doc"), "read"),
        Err(AccessError::StoreUnavailable(_))
    ));
    assert!(matches!(
        access.add_rule(Some("doc"), "read", "true", "", None),
        Err(AccessError::StoreUnavailable(_))
    ));

    // Failed lookups are not cached
    store.set_available(true);
    assert!(session.decision_cache().is_empty());
}
