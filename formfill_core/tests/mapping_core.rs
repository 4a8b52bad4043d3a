use approx::assert_relative_eq;
use chrono::NaiveDate;
use formfill_core::decompose::{composite_groups, split_address};
use formfill_core::*;

fn reference() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 10).expect("valid date")
}

fn map(entities: &[Entity], fields: &[FieldDescriptor]) -> MappingPass {
    let normalized = Normalizer::new(reference()).normalize_all(entities);
    MappingEngine::default().map(&normalized, fields, &Locks::default(), &mut ClarificationSeq::default())
}

fn address_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("current_address", ValueType::Address, ["current", "address"]),
        FieldDescriptor::new("permanent_address", ValueType::Address, ["permanent", "address"]),
    ]
}

fn address_group(prefix: &str) -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("addr_street", ValueType::Text, [prefix, "address", "street"]).part_of("addr", AddressPart::Street),
        FieldDescriptor::new("addr_city", ValueType::Text, [prefix, "address", "city"]).part_of("addr", AddressPart::City),
        FieldDescriptor::new("addr_state", ValueType::Text, [prefix, "address", "state"]).part_of("addr", AddressPart::State),
        FieldDescriptor::new("addr_pin", ValueType::Pincode, [prefix, "address", "pincode"]).part_of("addr", AddressPart::Pincode),
    ]
}

#[test]
fn spoken_phone_fills_mobile_field() {
    let entities = [Entity::new(
        "e1",
        ValueType::Phone,
        "nine eight seven six five four three two one zero",
        0.92,
    )
    .with_normalized("9876543210")];
    let fields = [FieldDescriptor::new("f1", ValueType::Phone, ["mobile", "number"])];

    let pass = map(&entities, &fields);
    let f1 = &pass.resolution.filled["f1"];
    assert_eq!(f1.value, "9876543210");
    assert_relative_eq!(f1.confidence, 0.92);
    assert_eq!(f1.provenance, Provenance::Entity { entity_id: "e1".into() });
    assert!(f1.validated);
    assert!(pass.resolution.clarifications.is_empty());
    assert!(pass.resolution.unmatched.is_empty());

    let c = &pass.candidates[0];
    assert_relative_eq!(c.score, 1.0);
    assert!(c.reasons.contains(&ReasonCode::TypeExact));
    assert!(c.reasons.contains(&ReasonCode::LabelUnavailable));
    assert!(c.reasons.contains(&ReasonCode::ContextUnavailable));
}

#[test]
fn tied_address_fields_ask_instead_of_guessing() {
    let entities = [Entity::new("a1", ValueType::Address, "12 MG Road, Bengaluru", 0.9)];
    let pass = map(&entities, &address_fields());

    assert!(pass.resolution.filled.is_empty());
    assert_eq!(pass.resolution.clarifications.len(), 1);
    let cr = &pass.resolution.clarifications[0];
    assert_eq!(cr.id, "clr-1");
    assert_eq!(cr.reason, ClarificationReason::Ambiguous);
    assert_eq!(
        cr.subject,
        ClarificationSubject::Entity {
            entity_id: "a1".into(),
            competing_fields: vec!["current_address".into(), "permanent_address".into()],
        }
    );
    // Waiting on the user, not unmatched.
    assert!(pass.resolution.unmatched.is_empty());
}

#[test]
fn short_phone_is_offered_for_correction() {
    let entities = [Entity::new("e1", ValueType::Phone, "12345", 0.8)];
    let fields = [FieldDescriptor::new("f1", ValueType::Phone, ["phone"])];

    let normalized = Normalizer::new(reference()).normalize_all(&entities);
    assert!(!normalized[0].validated());
    assert!(matches!(normalized[0].issue(), Some(ValueError::Format { kind: ValueType::Phone, .. })));

    let pass = map(&entities, &fields);
    assert!(pass.resolution.filled.is_empty());
    assert_eq!(pass.resolution.corrections.len(), 1);
    let offer = &pass.resolution.corrections[0];
    assert_eq!(offer.entity_id, "e1");
    assert_eq!(offer.field_id, "f1");
    assert_eq!(offer.value, "12345");
    assert_eq!(offer.reason, ReasonCode::InvalidValue);
    assert!(offer.issue.is_some());
}

#[test]
fn label_hints_break_address_tie() {
    let entities = [Entity::new("a1", ValueType::Address, "4 Park Street, Kolkata", 0.95)
        .with_hints(["permanent", "address"])];
    let pass = map(&entities, &address_fields());

    let score = |f: &str| pass.candidates.iter().find(|c| c.field_id == f).map(|c| c.score);
    assert_relative_eq!(score("permanent_address").unwrap(), 1.0);
    assert_relative_eq!(score("current_address").unwrap(), 0.8125, epsilon = 1e-4);

    let filled = &pass.resolution.filled;
    assert_eq!(filled.len(), 1);
    assert_eq!(filled["permanent_address"].value, "4 Park Street, Kolkata");
    assert_relative_eq!(filled["permanent_address"].confidence, 0.95);
    assert!(pass.resolution.clarifications.is_empty());
}

#[test]
fn synonym_hint_scores_partial_label_credit() {
    let entities = [Entity::new("e1", ValueType::Phone, "9876543210", 0.9).with_hints(["my", "mobile", "is"])];
    let fields = [FieldDescriptor::new("f1", ValueType::Phone, ["Phone", "Number"])];

    let pass = map(&entities, &fields);
    let c = &pass.candidates[0];
    assert_relative_eq!(c.signals.label.unwrap(), 0.6, epsilon = 1e-4);
    assert_relative_eq!(c.score, 0.85, epsilon = 1e-4);
    assert!(c.reasons.contains(&ReasonCode::LabelSynonym));
    assert!(pass.resolution.filled.contains_key("f1"));
}

#[test]
fn supertype_match_alone_is_low_confidence() {
    let entities = [Entity::new("a1", ValueType::Address, "12 MG Road, Bengaluru", 0.9)];
    let fields = [FieldDescriptor::new("permanent_address", ValueType::PermanentAddress, ["permanent", "address"])];

    let pass = map(&entities, &fields);
    assert_relative_eq!(pass.candidates[0].score, 0.5);
    assert!(pass.candidates[0].reasons.contains(&ReasonCode::TypeSupertype));

    assert!(pass.resolution.filled.is_empty());
    let cr = &pass.resolution.clarifications[0];
    assert_eq!(cr.reason, ClarificationReason::LowConfidence);
    assert!(cr.names_field("permanent_address"));
}

#[test]
fn weak_pairs_leave_entity_unmatched() {
    let entities = [Entity::new("a1", ValueType::Address, "12 MG Road", 0.9).with_hints(["mobile"])];
    let fields = [FieldDescriptor::new("permanent_address", ValueType::PermanentAddress, ["permanent", "address"])];

    let pass = map(&entities, &fields);
    assert_relative_eq!(pass.candidates[0].score, 0.3125, epsilon = 1e-4);
    assert!(pass.resolution.filled.is_empty());
    assert!(pass.resolution.clarifications.is_empty());
    assert_eq!(pass.resolution.unmatched, vec!["a1".to_string()]);
}

#[test]
fn incompatible_and_untyped_entities_produce_no_candidates() {
    let entities = [
        Entity::new("e1", ValueType::Email, "ravi at gmail dot com", 0.9),
        Entity::new("e2", ValueType::Unknown, "something", 0.9),
    ];
    let fields = [FieldDescriptor::new("f1", ValueType::Phone, ["phone"])];

    let pass = map(&entities, &fields);
    assert!(pass.candidates.is_empty());
    assert_eq!(pass.resolution.unmatched, vec!["e1".to_string(), "e2".to_string()]);
}

#[test]
fn answers_in_form_order_follow_reading_order() {
    let entities = [
        Entity::new("e1", ValueType::Name, "ravi kumar", 0.9).at(0),
        Entity::new("e2", ValueType::Name, "suresh kumar", 0.85).at(1),
    ];
    let fields = [
        FieldDescriptor::new("applicant_name", ValueType::Name, ["applicant", "name"]),
        FieldDescriptor::new("father_name", ValueType::Name, ["father", "name"]),
    ];

    let pass = map(&entities, &fields);
    let cross = pass
        .candidates
        .iter()
        .find(|c| c.entity_id == "e1" && c.field_id == "father_name")
        .unwrap();
    assert_relative_eq!(cross.score, 0.7143, epsilon = 1e-4);

    let filled = &pass.resolution.filled;
    assert_eq!(filled["applicant_name"].value, "Ravi Kumar");
    assert_eq!(filled["father_name"].value, "Suresh Kumar");
    assert_relative_eq!(filled["father_name"].confidence, 0.85);
}

#[test]
fn two_entities_for_one_field_raise_field_clarification() {
    let entities = [
        Entity::new("e1", ValueType::Phone, "9876543210", 0.9).at(0),
        Entity::new("e2", ValueType::Phone, "9123456780", 0.9).at(1),
    ];
    let fields = [FieldDescriptor::new("f1", ValueType::Phone, ["mobile"])];

    let pass = map(&entities, &fields);
    assert!(pass.resolution.filled.is_empty());
    assert_eq!(
        pass.resolution.clarifications[0].subject,
        ClarificationSubject::Field {
            field_id: "f1".into(),
            competing_entities: vec!["e1".into(), "e2".into()],
        }
    );
    assert!(pass.resolution.unmatched.is_empty());
}

#[test]
fn format_spec_violation_is_never_committed() {
    let entities = [Entity::new("e1", ValueType::Name, "ravi kumar", 0.95)];
    let fields = [FieldDescriptor::new("naam", ValueType::Name, ["name"]).with_format(FormatSpec {
        charset: Some(CharClass::Devanagari),
        max_len: None,
    })];

    let pass = map(&entities, &fields);
    assert!(pass.candidates[0].reasons.contains(&ReasonCode::FormatSpecViolation));
    assert!(pass.resolution.filled.is_empty());
    let offer = &pass.resolution.corrections[0];
    assert_eq!(offer.reason, ReasonCode::FormatSpecViolation);
    assert!(matches!(offer.issue, Some(ValueError::Format { kind: ValueType::Name, .. })));
}

#[test]
fn format_spec_violation_falls_through_to_a_valid_field() {
    let entities = [Entity::new("e1", ValueType::Name, "ravi kumar", 0.95)];
    let fields = [
        FieldDescriptor::new("name_hi", ValueType::Name, ["name"])
            .required()
            .with_format(FormatSpec {
                charset: Some(CharClass::Devanagari),
                max_len: None,
            }),
        FieldDescriptor::new("name_en", ValueType::Name, ["name"])
            .required()
            .with_format(FormatSpec {
                charset: Some(CharClass::Latin),
                max_len: None,
            }),
    ];

    let pass = map(&entities, &fields);
    let res = &pass.resolution;
    assert_eq!(res.filled["name_en"].value, "Ravi Kumar");
    assert!(!res.filled.contains_key("name_hi"));
    assert!(res.clarifications.is_empty());
    assert!(res.corrections.is_empty());
    assert!(res.unmatched.is_empty());

    let c = evaluate(&fields, &res.filled, &res.clarifications, &MappingCfg::default());
    assert_eq!(c.unresolved_required, vec!["name_hi".to_string()]);
}

#[test]
fn format_spec_checks_length() {
    let spec = FormatSpec {
        charset: Some(CharClass::Latin),
        max_len: Some(5),
    };
    assert!(spec.check(ValueType::Name, "Ravi").is_ok());
    assert!(spec.check(ValueType::Name, "Ravi Kumar").is_err());
    assert!(spec.check(ValueType::Name, "रवि").is_err());
}

#[test]
fn locked_fields_and_entities_are_left_alone() {
    let normalized = Normalizer::new(reference()).normalize_all(&[Entity::new("e1", ValueType::Phone, "9876543210", 0.9)]);
    let fields = [FieldDescriptor::new("f1", ValueType::Phone, ["mobile"])];
    let engine = MappingEngine::default();

    let mut locks = Locks::default();
    locks.fields.insert("f1".into());
    let pass = engine.map(&normalized, &fields, &locks, &mut ClarificationSeq::default());
    assert!(pass.resolution.filled.is_empty());
    assert_eq!(pass.resolution.unmatched, vec!["e1".to_string()]);

    let mut locks = Locks::default();
    locks.entities.insert("e1".into());
    let pass = engine.map(&normalized, &fields, &locks, &mut ClarificationSeq::default());
    assert!(pass.resolution.filled.is_empty());
    assert!(pass.resolution.unmatched.is_empty());
}

#[test]
fn repeated_resolution_is_identical() {
    let entities = [
        Entity::new("e1", ValueType::Phone, "9876543210", 0.9).at(0),
        Entity::new("e2", ValueType::Phone, "9123456780", 0.9).at(1),
        Entity::new("a1", ValueType::Address, "12 MG Road, Bengaluru", 0.9).at(2),
    ];
    let mut fields = vec![FieldDescriptor::new("f1", ValueType::Phone, ["mobile"])];
    fields.extend(address_fields());

    let a = map(&entities, &fields);
    let b = map(&entities, &fields);
    assert_eq!(a.resolution, b.resolution);
    assert_eq!(a.candidates, b.candidates);
}

#[test]
fn clarification_ids_continue_across_passes() {
    let normalized =
        Normalizer::new(reference()).normalize_all(&[Entity::new("a1", ValueType::Address, "12 MG Road", 0.9)]);
    let engine = MappingEngine::default();
    let mut seq = ClarificationSeq::default();

    let first = engine.map(&normalized, &address_fields(), &Locks::default(), &mut seq);
    let second = engine.map(&normalized, &address_fields(), &Locks::default(), &mut seq);
    assert_eq!(first.resolution.clarifications[0].id, "clr-1");
    assert_eq!(second.resolution.clarifications[0].id, "clr-2");
}

#[test]
fn split_indian_address() {
    let parts = split_address("12 MG Road, Indiranagar, Bengaluru, Karnataka 560038");
    assert_eq!(parts.street.as_deref(), Some("12 MG Road, Indiranagar"));
    assert_eq!(parts.city.as_deref(), Some("Bengaluru"));
    assert_eq!(parts.state.as_deref(), Some("Karnataka"));
    assert_eq!(parts.pincode.as_deref(), Some("560038"));

    let bare = split_address("Flat 3, Pune");
    assert_eq!(bare.street.as_deref(), Some("Flat 3"));
    assert_eq!(bare.city.as_deref(), Some("Pune"));
    assert_eq!(bare.state, None);
    assert_eq!(bare.pincode, None);
}

#[test]
fn address_entity_fans_out_to_composite_group() {
    let entities = [Entity::new(
        "a1",
        ValueType::Address,
        "12 MG Road, Indiranagar, Bengaluru, Karnataka 560038",
        0.88,
    )];
    let fields = address_group("current");
    assert_eq!(composite_groups(&fields).len(), 1);

    let pass = map(&entities, &fields);
    assert!(pass.candidates.is_empty());

    let filled = &pass.resolution.filled;
    assert_eq!(filled["addr_street"].value, "12 MG Road, Indiranagar");
    assert_eq!(filled["addr_city"].value, "Bengaluru");
    assert_eq!(filled["addr_state"].value, "Karnataka");
    assert_eq!(filled["addr_pin"].value, "560038");
    assert!(filled.values().all(|f| f.provenance.entity() == Some("a1")));
    assert_relative_eq!(filled["addr_pin"].confidence, 0.88);
    assert!(pass.resolution.unmatched.is_empty());
}

#[test]
fn composite_group_uses_hints_to_pick_entity() {
    let entities = [
        Entity::new("a1", ValueType::Address, "12 MG Road, Bengaluru, Karnataka 560038", 0.9)
            .with_hints(["current", "address"])
            .at(0),
        Entity::new("a2", ValueType::Address, "4 Park Street, Kolkata, West Bengal 700016", 0.9)
            .with_hints(["permanent", "address"])
            .at(1),
    ];
    let pass = map(&entities, &address_group("current"));

    assert_eq!(pass.resolution.filled["addr_city"].value, "Bengaluru");
    assert!(pass.resolution.clarifications.is_empty());
    assert_eq!(pass.resolution.unmatched, vec!["a2".to_string()]);
}

#[test]
fn composite_group_with_unrelated_hints_is_not_filled() {
    let entities = [Entity::new("a1", ValueType::Address, "9 Office Park, Pune, Maharashtra 411001", 0.95)
        .with_hints(["office", "workplace"])];
    let pass = map(&entities, &address_group("permanent"));
    let res = &pass.resolution;

    assert!(res.filled.is_empty());
    assert_eq!(res.clarifications.len(), 1);
    let cr = &res.clarifications[0];
    assert_eq!(cr.reason, ClarificationReason::LowConfidence);
    assert_eq!(
        cr.subject,
        ClarificationSubject::Field {
            field_id: "addr_street".into(),
            competing_entities: vec!["a1".into()],
        }
    );
    assert_relative_eq!(cr.top_score, 0.625);
    assert!(res.unmatched.is_empty());
}

#[test]
fn indistinguishable_addresses_for_group_ask_the_user() {
    let entities = [
        Entity::new("a1", ValueType::Address, "12 MG Road, Bengaluru, Karnataka 560038", 0.9).at(0),
        Entity::new("a2", ValueType::Address, "4 Park Street, Kolkata, West Bengal 700016", 0.9).at(1),
    ];
    let pass = map(&entities, &address_group("current"));

    assert!(pass.resolution.filled.is_empty());
    assert_eq!(
        pass.resolution.clarifications[0].subject,
        ClarificationSubject::Field {
            field_id: "addr_street".into(),
            competing_entities: vec!["a1".into(), "a2".into()],
        }
    );
    assert!(pass.resolution.unmatched.is_empty());
}

#[test]
fn completeness_counts_required_fields() {
    let cfg = MappingCfg::default();
    let fields = [
        FieldDescriptor::new("name", ValueType::Name, ["name"]).required(),
        FieldDescriptor::new("phone", ValueType::Phone, ["phone"]).required(),
        FieldDescriptor::new("email", ValueType::Email, ["email"]),
    ];
    let mut filled = std::collections::BTreeMap::new();
    filled.insert(
        "name".to_string(),
        FilledField {
            field_id: "name".into(),
            value: "Ravi Kumar".into(),
            confidence: 0.7,
            provenance: Provenance::Entity { entity_id: "e1".into() },
            validated: true,
            issue: None,
        },
    );

    let c = evaluate(&fields, &filled, &[], &cfg);
    assert_relative_eq!(c.ratio, 0.5);
    assert_eq!(c.filled_required, 1);
    assert_eq!(c.total_required, 2);
    assert_eq!(c.unresolved_required, vec!["phone".to_string()]);
    assert_eq!(c.low_confidence, vec!["name".to_string()]);
    assert!(!c.ready(&cfg));

    // A pending clarification covers the empty field but still blocks.
    let pending = ClarificationRequest {
        id: "clr-1".into(),
        subject: ClarificationSubject::Field {
            field_id: "phone".into(),
            competing_entities: vec!["e2".into(), "e3".into()],
        },
        reason: ClarificationReason::Ambiguous,
        top_score: 1.0,
    };
    let c = evaluate(&fields, &filled, &[pending], &cfg);
    assert!(c.unresolved_required.is_empty());
    assert_eq!(c.pending_clarifications, 1);
    assert!(!c.ready(&cfg));
}

#[test]
fn no_required_fields_means_complete() {
    let cfg = MappingCfg::default();
    let fields = [FieldDescriptor::new("email", ValueType::Email, ["email"])];
    let c = evaluate(&fields, &Default::default(), &[], &cfg);
    assert_relative_eq!(c.ratio, 1.0);
    assert!(c.ready(&cfg));
}

#[test]
fn invalid_fields_block_only_when_configured() {
    let fields = [FieldDescriptor::new("age", ValueType::Age, ["age"]).required()];
    let mut filled = std::collections::BTreeMap::new();
    filled.insert(
        "age".to_string(),
        FilledField {
            field_id: "age".into(),
            value: "150".into(),
            confidence: 1.0,
            provenance: Provenance::Manual { entity_id: None },
            validated: false,
            issue: None,
        },
    );

    let lenient = MappingCfg::default();
    let c = evaluate(&fields, &filled, &[], &lenient);
    assert_eq!(c.invalid, vec!["age".to_string()]);
    assert!(c.ready(&lenient));

    let strict = MappingCfg {
        block_on_invalid: true,
        ..MappingCfg::default()
    };
    assert!(!evaluate(&fields, &filled, &[], &strict).ready(&strict));
}

#[test]
fn schema_violations_are_rejected() {
    let fields = [
        FieldDescriptor::new("f1", ValueType::Phone, ["phone"]),
        FieldDescriptor::new("f1", ValueType::Email, ["email"]),
    ];
    assert_eq!(check_schema(&[], &fields), Err(SchemaError::DuplicateField("f1".into())));

    let blank = [FieldDescriptor::new(" ", ValueType::Phone, ["phone"])];
    assert_eq!(check_schema(&[], &blank), Err(SchemaError::EmptyFieldId(0)));

    let entities = [Entity::new("e1", ValueType::Phone, "9876543210", 1.5)];
    assert!(matches!(check_entities(&entities), Err(SchemaError::ConfidenceOutOfRange { .. })));

    let dup = [
        Entity::new("e1", ValueType::Phone, "9876543210", 0.9),
        Entity::new("e1", ValueType::Email, "a@b.com", 0.9),
    ];
    assert_eq!(check_entities(&dup), Err(SchemaError::DuplicateEntity("e1".into())));
}

#[test]
fn cfg_overrides_from_json() {
    let cfg = MappingCfg::from_json(r#"{"ambiguity_margin": 0.05, "block_on_invalid": true}"#).unwrap();
    assert_relative_eq!(cfg.ambiguity_margin, 0.05);
    assert!(cfg.block_on_invalid);
    assert_relative_eq!(cfg.confident, 0.8);

    assert!(matches!(
        MappingCfg::from_json(r#"{"min_consider": 0.9, "confident": 0.5}"#),
        Err(CfgError::ThresholdOrder { .. })
    ));
    assert!(matches!(
        MappingCfg::from_json(r#"{"confident": 1.5}"#),
        Err(CfgError::OutOfUnitRange { name: "confident", .. })
    ));
    assert!(matches!(MappingCfg::from_json(r#"{"w_type": 0.0}"#), Err(CfgError::Weights)));
    assert!(matches!(MappingCfg::from_json("{"), Err(CfgError::Json(_))));
}

#[test]
fn lexicon_drops_stopwords_and_matches_groups() {
    let lx = Lexicon::default_en();
    assert_eq!(lx.label_tokens(&["My Mobile", "number is"]), vec!["mobile", "number"]);
    assert!(lx.synonyms("mobile", "phone"));
    assert!(!lx.synonyms("mobile", "email"));
    assert!(!lx.synonyms("unknownword", "unknownword"));
}

#[test]
fn pruning_to_one_field_is_no_longer_a_tie() {
    let mut cr = ClarificationRequest {
        id: "clr-1".into(),
        subject: ClarificationSubject::Entity {
            entity_id: "a1".into(),
            competing_fields: vec!["current_address".into(), "permanent_address".into(), "office_address".into()],
        },
        reason: ClarificationReason::Ambiguous,
        top_score: 1.0,
    };

    assert!(cr.prune_field("office_address"));
    assert_eq!(cr.reason, ClarificationReason::Ambiguous);
    assert!(cr.prune_field("current_address"));
    assert_eq!(cr.reason, ClarificationReason::LowConfidence);
    assert!(cr.names_field("permanent_address"));
    assert!(!cr.prune_field("permanent_address"));
}
