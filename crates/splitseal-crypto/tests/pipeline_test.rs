//! End-to-end tests for protect / unprotect / verify_integrity.
//!
//! Covers the reference record, tamper detection across every byte of
//! fragment A, wrong-key rejection, and the error kind reported for each
//! failure path.

use proptest::prelude::*;
use serde_json::json;
use splitseal_core::config::ProtectionConfig;
use splitseal_core::{ErrorKind, ProtectOptions, ProtectedRecord, SealError};
use splitseal_crypto::{
    batch_verify, derive_hardware_keys, integrity_report, FragmentPair, HardwareKeys, KeySeed,
    SecurityCore, COMMITMENT_HEX_LEN, FRAGMENT_B_SIZE, KEY_SIZE, NONCE_SIZE, TAG_SIZE,
};

fn reference_record() -> ProtectedRecord {
    json!({"name": "Ahmad", "ic": "123"})
        .as_object()
        .cloned()
        .expect("object literal")
}

fn reference_keys() -> HardwareKeys {
    HardwareKeys::from_bytes([0x11u8; KEY_SIZE], [0x22u8; KEY_SIZE])
}

#[test]
fn reference_record_roundtrip() {
    let core = SecurityCore::default();
    let out = core
        .protect(&reference_record(), &reference_keys(), &ProtectOptions::default())
        .expect("protect should succeed");

    assert!(!out.fragment_a.is_empty());
    assert_eq!(out.fragment_b.len(), FRAGMENT_B_SIZE);
    assert_eq!(out.commitment.len(), COMMITMENT_HEX_LEN);

    let restored = core
        .unprotect(&out.fragment_a, &out.fragment_b, &reference_keys(), &out.metadata)
        .expect("unprotect should succeed");
    assert_eq!(restored, reference_record());
    assert_eq!(
        serde_json::to_value(&restored).unwrap(),
        json!({"name": "Ahmad", "ic": "123"})
    );
}

#[test]
fn flipped_fragment_a_byte_is_rejected() {
    let core = SecurityCore::default();
    let out = core
        .protect(&reference_record(), &reference_keys(), &ProtectOptions::default())
        .unwrap();

    let mut fragment_a = out.fragment_a.clone();
    let mid = fragment_a.len() / 2;
    fragment_a[mid] ^= 0x01;

    let err = core
        .unprotect(&fragment_a, &out.fragment_b, &reference_keys(), &out.metadata)
        .unwrap_err();
    assert!(
        matches!(err.kind(), ErrorKind::AuthenticationFailure | ErrorKind::TamperDetected),
        "unexpected error: {err}"
    );
}

#[test]
fn wrong_key_b_is_fingerprint_mismatch() {
    let core = SecurityCore::default();
    let out = core
        .protect(&reference_record(), &reference_keys(), &ProtectOptions::default())
        .unwrap();

    let wrong = HardwareKeys::from_bytes([0x11u8; KEY_SIZE], [0x33u8; KEY_SIZE]);
    let err = core
        .unprotect(&out.fragment_a, &out.fragment_b, &wrong, &out.metadata)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FingerprintMismatch);
    match err {
        SealError::FingerprintMismatch { expected, actual } => {
            assert_eq!(expected, reference_keys().fingerprint());
            assert_eq!(actual, wrong.fingerprint());
        }
        other => panic!("expected FingerprintMismatch, got {other:?}"),
    }
}

#[test]
fn fragment_b_from_other_record_fails_authentication() {
    let core = SecurityCore::default();
    let keys = reference_keys();
    let first = core
        .protect(&reference_record(), &keys, &ProtectOptions::default())
        .unwrap();
    let second = core
        .protect(&reference_record(), &keys, &ProtectOptions::default())
        .unwrap();

    let err = core
        .unprotect(&first.fragment_a, &second.fragment_b, &keys, &first.metadata)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
}

#[test]
fn truncated_fragment_a_fails_authentication() {
    let core = SecurityCore::default();
    let keys = reference_keys();
    let out = core
        .protect(&reference_record(), &keys, &ProtectOptions::default())
        .unwrap();

    // keep fragment B consistent so the short fragment reaches the parser
    let short = &out.fragment_a[..NONCE_SIZE + TAG_SIZE - 1];
    let fragment_b = splitseal_crypto::bind_fragment_b(short, &keys);
    let err = core
        .unprotect(short, &fragment_b, &keys, &out.metadata)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
}

#[test]
fn altered_original_size_is_tamper_detected() {
    let core = SecurityCore::default();
    let out = core
        .protect(&reference_record(), &reference_keys(), &ProtectOptions::default())
        .unwrap();

    let mut metadata = out.metadata.clone();
    metadata.original_size += 1;
    let err = core
        .unprotect(&out.fragment_a, &out.fragment_b, &reference_keys(), &metadata)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TamperDetected);
}

#[test]
fn altered_original_size_without_canaries_is_tamper_detected() {
    let core = SecurityCore::default();
    let options = ProtectOptions {
        anti_tampering: false,
        nonce: None,
    };
    let out = core
        .protect(&reference_record(), &reference_keys(), &options)
        .unwrap();

    let mut metadata = out.metadata.clone();
    metadata.original_size -= 1;
    let err = core
        .unprotect(&out.fragment_a, &out.fragment_b, &reference_keys(), &metadata)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TamperDetected);
}

#[test]
fn invalid_keys_are_rejected() {
    let core = SecurityCore::default();
    let zeros = HardwareKeys::from_bytes([0u8; KEY_SIZE], [0x22u8; KEY_SIZE]);
    let err = core
        .protect(&reference_record(), &zeros, &ProtectOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidKeyMaterial);

    let ones = HardwareKeys::from_bytes([0x11u8; KEY_SIZE], [0xFFu8; KEY_SIZE]);
    let err = core
        .protect(&reference_record(), &ones, &ProtectOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidKeyMaterial);

    assert!(HardwareKeys::from_slices(&[0x11u8; 31], &[0x22u8; KEY_SIZE]).is_err());
}

#[test]
fn stricter_density_config_rejects_reference_keys() {
    let config = ProtectionConfig {
        min_bit_density: 0.3,
        max_bit_density: 0.7,
        ..ProtectionConfig::default()
    };
    let core = SecurityCore::new(config).unwrap();
    let err = core
        .protect(&reference_record(), &reference_keys(), &ProtectOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidKeyMaterial);
}

#[test]
fn fixed_nonce_protect_is_deterministic_except_canaries() {
    let core = SecurityCore::default();
    let options = ProtectOptions {
        anti_tampering: false,
        nonce: Some([0x5Au8; NONCE_SIZE]),
    };
    let a = core
        .protect(&reference_record(), &reference_keys(), &options)
        .unwrap();
    let b = core
        .protect(&reference_record(), &reference_keys(), &options)
        .unwrap();

    assert_eq!(a.fragment_a, b.fragment_a);
    assert_eq!(a.fragment_b, b.fragment_b);
    assert_eq!(a.commitment, b.commitment);
}

#[test]
fn canary_count_follows_config() {
    let config = ProtectionConfig {
        canary_count: 7,
        ..ProtectionConfig::default()
    };
    let core = SecurityCore::new(config).unwrap();
    let out = core
        .protect(&reference_record(), &reference_keys(), &ProtectOptions::default())
        .unwrap();
    assert_eq!(out.metadata.canary_count, 7);

    // a core configured differently still honours the stored count
    let restored = SecurityCore::default()
        .unprotect(&out.fragment_a, &out.fragment_b, &reference_keys(), &out.metadata)
        .unwrap();
    assert_eq!(restored, reference_record());
}

#[test]
fn empty_record_roundtrip() {
    let core = SecurityCore::default();
    let empty = ProtectedRecord::new();
    let out = core
        .protect(&empty, &reference_keys(), &ProtectOptions::default())
        .unwrap();
    let restored = core
        .unprotect(&out.fragment_a, &out.fragment_b, &reference_keys(), &out.metadata)
        .unwrap();
    assert!(restored.is_empty());
}

#[test]
fn nested_record_roundtrip() {
    let core = SecurityCore::default();
    let record = json!({
        "patient": {"name": "Siti", "allergies": ["penicillin", "latex"]},
        "visits": [{"date": "2026-01-02", "notes": null}, {"date": "2026-03-04", "bp": 120.5}],
        "active": true
    })
    .as_object()
    .cloned()
    .unwrap();

    let out = core
        .protect(&record, &reference_keys(), &ProtectOptions::default())
        .unwrap();
    let restored = core
        .unprotect(&out.fragment_a, &out.fragment_b, &reference_keys(), &out.metadata)
        .unwrap();
    assert_eq!(restored, record);
}

#[test]
fn seed_derived_keys_roundtrip() {
    let core = SecurityCore::default();
    let seed = KeySeed::new(
        b"card-public-key-bytes".to_vec(),
        b"phone-public-key-bytes".to_vec(),
        "did:example:patient-7",
    );

    let out = core
        .protect_with_seed(&reference_record(), &seed, &ProtectOptions::default())
        .unwrap();
    assert!(!out.metadata.flags.sealed_derivation);

    let keys = derive_hardware_keys(&seed).unwrap();
    let restored = core
        .unprotect(&out.fragment_a, &out.fragment_b, &keys, &out.metadata)
        .unwrap();
    assert_eq!(restored, reference_record());

    let other_identity = KeySeed::new(
        b"card-public-key-bytes".to_vec(),
        b"phone-public-key-bytes".to_vec(),
        "did:example:patient-8",
    );
    let wrong = derive_hardware_keys(&other_identity).unwrap();
    let err = core
        .unprotect(&out.fragment_a, &out.fragment_b, &wrong, &out.metadata)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FingerprintMismatch);
}

#[test]
fn verify_integrity_detects_swapped_and_corrupted_fragments() {
    let core = SecurityCore::default();
    let out = core
        .protect(&reference_record(), &reference_keys(), &ProtectOptions::default())
        .unwrap();

    assert!(core.verify_integrity(&out.fragment_a, &out.fragment_b, &out.commitment, &out.metadata));

    let mut b = out.fragment_b;
    b[0] ^= 0x80;
    assert!(!core.verify_integrity(&out.fragment_a, &b, &out.commitment, &out.metadata));

    let report = integrity_report(&out.fragment_a, &b, &out.commitment);
    assert!(!report.commitment_valid);
    assert_eq!(report.fragment_b_size, FRAGMENT_B_SIZE as u64);
}

#[test]
fn batch_verify_over_many_records() {
    let core = SecurityCore::default();
    let outputs: Vec<_> = (0..4)
        .map(|i| {
            let record = json!({"id": i}).as_object().cloned().unwrap();
            core.protect(&record, &reference_keys(), &ProtectOptions::default())
                .unwrap()
        })
        .collect();

    let mut pairs: Vec<FragmentPair<'_>> = outputs
        .iter()
        .map(|o| FragmentPair {
            fragment_a: &o.fragment_a,
            fragment_b: &o.fragment_b,
            commitment: &o.commitment,
        })
        .collect();
    pairs[2].commitment = &outputs[1].commitment;

    assert_eq!(batch_verify(&pairs), vec![true, true, false, true]);
}

#[test]
fn metadata_survives_json_roundtrip() {
    let core = SecurityCore::default();
    let out = core
        .protect(&reference_record(), &reference_keys(), &ProtectOptions::default())
        .unwrap();

    let bytes = out.metadata.to_bytes().unwrap();
    let text = String::from_utf8(bytes.clone()).unwrap();
    assert!(text.contains("\"canaryCount\""));
    assert!(text.contains("\"originalSize\""));

    let metadata = splitseal_core::ProtectionMetadata::from_bytes(&bytes).unwrap();
    let restored = core
        .unprotect(&out.fragment_a, &out.fragment_b, &reference_keys(), &metadata)
        .unwrap();
    assert_eq!(restored, reference_record());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_fragment_a_byte_is_tamper_evident(
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let core = SecurityCore::default();
        let keys = reference_keys();
        let out = core.protect(&reference_record(), &keys, &ProtectOptions::default()).unwrap();

        let mut fragment_a = out.fragment_a.clone();
        let i = index.index(fragment_a.len());
        fragment_a[i] ^= 1 << bit;

        let result = core.unprotect(&fragment_a, &out.fragment_b, &keys, &out.metadata);
        prop_assert!(result.is_err());
        let kind = result.unwrap_err().kind();
        prop_assert!(matches!(kind, ErrorKind::AuthenticationFailure | ErrorKind::TamperDetected));
        prop_assert!(!core.verify_integrity(&fragment_a, &out.fragment_b, &out.commitment, &out.metadata));
    }

    #[test]
    fn any_key_bit_flip_is_rejected(
        index in 0usize..(2 * KEY_SIZE),
        bit in 0u8..8,
    ) {
        let core = SecurityCore::default();
        let out = core
            .protect(&reference_record(), &reference_keys(), &ProtectOptions::default())
            .unwrap();

        let mut a = [0x11u8; KEY_SIZE];
        let mut b = [0x22u8; KEY_SIZE];
        if index < KEY_SIZE {
            a[index] ^= 1 << bit;
        } else {
            b[index - KEY_SIZE] ^= 1 << bit;
        }
        let altered = HardwareKeys::from_bytes(a, b);
        prop_assert!(core
            .unprotect(&out.fragment_a, &out.fragment_b, &altered, &out.metadata)
            .is_err());
    }

    #[test]
    fn arbitrary_string_records_roundtrip(
        fields in proptest::collection::btree_map("[a-z]{1,8}", ".{0,64}", 0..12),
    ) {
        let core = SecurityCore::default();
        let record: ProtectedRecord = fields
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();

        let out = core.protect(&record, &reference_keys(), &ProtectOptions::default()).unwrap();
        prop_assert_eq!(out.fragment_b.len(), FRAGMENT_B_SIZE);
        prop_assert_eq!(out.commitment.len(), COMMITMENT_HEX_LEN);

        let restored = core
            .unprotect(&out.fragment_a, &out.fragment_b, &reference_keys(), &out.metadata)
            .unwrap();
        prop_assert_eq!(restored, record);
    }
}
