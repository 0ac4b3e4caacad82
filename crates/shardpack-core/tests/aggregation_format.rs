//! Aggregation format tests: byte-exact KPL compatibility, round-trips and
//! size-ceiling behavior of `PhysicalRecord`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use shardpack_core::{
    decode_physical, Error, PhysicalRecord, UserRecord, AGGREGATION_OVERHEAD,
    MAX_BYTES_PER_RECORD,
};

/// Produced by the reference KPL with explicit hash keys set.
const KPL_RECORD_WITH_EHKS: &str = concat!(
    "84mawgokZmMwM2RkODgtM2U3OS00NDhhLWIwMWEtN2NmMWJkNDdiNzg0CiRjYWU0MWIxYy1lYTYxLTQz",
    "ZjItOTBiZS1iODc1NWViZjg4ZTIKJGQ0OTA2OTBjLWU3NGQtNGRiMi1hM2M4LWQ4ZjJmMTg0ZmQyMwokYzkyNGJjMDktYjg1ZS00N2",
    "YxLWIzMmUtMzM2NTIyZWU1M2M4EiYzODQ4NjQ5NTg2NzUwODM5OTA3ODE1OTcyMzg0NjA1MTgwNzAyMBInMTkzNzg3NjAwMDM3Njgx",
    "NzA2OTUyMTQzMzU3MDcxOTE2MzUyNjA0EicyNjY4ODA0MzY5NjQ5MzI0MjQyNjU0NjY5MTY3MzQwNjg2ODQ0MzkSJzMzOTYwNjYwMD",
    "k0Mjk2NzM5MTg1NDYwMzU1MjQwMjAyMTg0NzI5MhomCAAQABogUkVDT1JEIDIyIHBlZW9iaGN6YnpkbXNrYm91cGd5cQoaJggBEAEa",
    "IFJFQ09SRCAyMyB1c3dreGZ0eHJvZXVzc2N4c2pobm8KGiYIAhACGiBSRUNPUkQgMjQgY2FzZWhkZ2l2ZmF4ZXVzdGx5c3p5ChomCA",
    "MQAxogUkVDT1JEIDI1IG52ZmZ2cG11b2dkb3BqaGFtZXZyawpRwVPQ3go0yp4Y6kvM0q3V",
);

/// Produced by the reference KPL without explicit hash keys.
const KPL_RECORD_NO_EHKS: &str = concat!(
    "84mawgokNzhmZWIxMmEtZGJhMC00NWNhLWE5MWUtYmIxZjJmMTgxOWI0CiRjMmE3NTc4Ny00NjliLTQzMTAtODQwZC1kNDg2ZGNhN2",
    "ViNWUKJDY1MGU5MzYyLTU3MmItNDQyNy1iM2ZjLTEzNTQ5ZDdlNWFlNQokMWQ4ZDk2MDAtMDBiNy00NmYzLWE5ODMtZGU4MzQ3NzU0",
    "MGMwCiRmMmU3MThhMC0zODliLTQ5NGEtYjc5Ni0zMzU1YjA3NTY5Y2MKJDk2NWI4ZGE0LWE2YmQtNDc1NS04MWM5LWU3MTgxYWI3ZG",
    "M5YQokZDY5M2M1ZjAtNTc3Mi00NmM5LThkODYtMDhjNzA1NWJkYjc1CiQ4ZDkyNDc2Yi1lYjg5LTRlODEtOTlmYi1jMmJhNjNhZDZk",
    "OTAaJAgAGiBSRUNPUkQgMTggaWtscnBzdnloeG5lcm9kZmVoZXJ1ChokCAEaIFJFQ09SRCAxOSBsbm1udWR5aHZwdmNncm9rZm16ZG",
    "gKGiQIAhogUkVDT1JEIDIwIHBqcXJjZmJ4YWZ6ZG5kem1iZ2FuZQoaJAgDGiBSRUNPUkQgMjEgYWFmcmV5cm50d3V3eGxpeWdrYmhr",
    "ChokCAQaIFJFQ09SRCAyMiBxc2FhZGhic2dtdnFnZGlmZ3V5b3UKGiQIBRogUkVDT1JEIDIzIHdqb2tvaXd2enpobGZ0bHpocWZqaw",
    "oaJAgGGiBSRUNPUkQgMjQgem9wY2FzY3J0aGJicG5qaXd1aGpiChokCAcaIFJFQ09SRCAyNSB0eGJidm5venJ3c2JveHVvbXFib3EK",
    "vV1rrLdU+Sy2v8xkgZ5YaA==",
);

fn kpl_inputs_with_ehks() -> Vec<UserRecord> {
    vec![
        UserRecord::new(
            "fc03dd88-3e79-448a-b01a-7cf1bd47b784",
            Some("38486495867508399078159723846051807020".to_string()),
            "RECORD 22 peeobhczbzdmskboupgyq\n",
        ),
        UserRecord::new(
            "cae41b1c-ea61-43f2-90be-b8755ebf88e2",
            Some("193787600037681706952143357071916352604".to_string()),
            "RECORD 23 uswkxftxroeusscxsjhno\n",
        ),
        UserRecord::new(
            "d490690c-e74d-4db2-a3c8-d8f2f184fd23",
            Some("266880436964932424265466916734068684439".to_string()),
            "RECORD 24 casehdgivfaxeustlyszy\n",
        ),
        UserRecord::new(
            "c924bc09-b85e-47f1-b32e-336522ee53c8",
            Some("339606600942967391854603552402021847292".to_string()),
            "RECORD 25 nvffvpmuogdopjhamevrk\n",
        ),
    ]
}

fn kpl_inputs_no_ehks() -> Vec<UserRecord> {
    [
        ("78feb12a-dba0-45ca-a91e-bb1f2f1819b4", "RECORD 18 iklrpsvyhxnerodfeheru\n"),
        ("c2a75787-469b-4310-840d-d486dca7eb5e", "RECORD 19 lnmnudyhvpvcgrokfmzdh\n"),
        ("650e9362-572b-4427-b3fc-13549d7e5ae5", "RECORD 20 pjqrcfbxafzdndzmbgane\n"),
        ("1d8d9600-00b7-46f3-a983-de83477540c0", "RECORD 21 aafreyrntwuwxliygkbhk\n"),
        ("f2e718a0-389b-494a-b796-3355b07569cc", "RECORD 22 qsaadhbsgmvqgdifguyou\n"),
        ("965b8da4-a6bd-4755-81c9-e7181ab7dc9a", "RECORD 23 wjokoiwvzzhlftlzhqfjk\n"),
        ("d693c5f0-5772-46c9-8d86-08c7055bdb75", "RECORD 24 zopcascrthbbpnjiwuhjb\n"),
        ("8d92476b-eb89-4e81-99fb-c2ba63ad6d90", "RECORD 25 txbbvnozrwsboxuomqboq\n"),
    ]
    .into_iter()
    .map(|(pk, data)| UserRecord::new(pk, None, data))
    .collect()
}

fn pack(inputs: &[UserRecord]) -> PhysicalRecord {
    let mut record = PhysicalRecord::default();
    for (i, input) in inputs.iter().enumerate() {
        let added = record
            .try_add(
                &input.partition_key,
                input.data.clone(),
                input.explicit_hash_key.as_deref(),
            )
            .unwrap();
        assert!(added, "record {i} did not fit");
        assert_eq!(record.len(), i + 1);
    }
    record
}

// ---------------------------------------------------------------
// Byte-exact compatibility with the KPL
// ---------------------------------------------------------------

#[test]
fn matches_kpl_with_explicit_hash_keys() {
    let record = pack(&kpl_inputs_with_ehks());
    let contents = record.contents();

    assert_eq!(
        contents.partition_key.as_deref(),
        Some("fc03dd88-3e79-448a-b01a-7cf1bd47b784")
    );
    assert_eq!(
        contents.explicit_hash_key.as_deref(),
        Some("38486495867508399078159723846051807020")
    );
    assert_eq!(STANDARD.encode(&contents.data), KPL_RECORD_WITH_EHKS);
    assert_eq!(contents.data.len(), record.size_bytes());
}

#[test]
fn matches_kpl_without_explicit_hash_keys() {
    let record = pack(&kpl_inputs_no_ehks());
    let contents = record.contents();

    assert_eq!(
        contents.partition_key.as_deref(),
        Some("78feb12a-dba0-45ca-a91e-bb1f2f1819b4")
    );
    assert_eq!(contents.explicit_hash_key, None);
    assert_eq!(STANDARD.encode(&contents.data), KPL_RECORD_NO_EHKS);
    assert_eq!(contents.data.len(), record.size_bytes());
}

#[test]
fn decodes_kpl_records() {
    for (encoded, expected) in [
        (KPL_RECORD_WITH_EHKS, kpl_inputs_with_ehks()),
        (KPL_RECORD_NO_EHKS, kpl_inputs_no_ehks()),
    ] {
        let raw = Bytes::from(STANDARD.decode(encoded).unwrap());
        let decoded = decode_physical(raw, true).unwrap();
        assert_eq!(decoded.into_user_records().unwrap(), expected);
    }
}

// ---------------------------------------------------------------
// Round-trip and size accounting
// ---------------------------------------------------------------

#[test]
fn roundtrip_preserves_order_and_keys() {
    let inputs: Vec<UserRecord> = (0..200)
        .map(|i| {
            let ehk = (i % 3 == 0).then(|| (i as u128 * 1_000_000_007).to_string());
            UserRecord::new(format!("key-{}", i % 17), ehk, vec![i as u8; i % 50])
        })
        .collect();

    let record = pack(&inputs);
    let decoded = decode_physical(record.to_bytes(), true).unwrap();

    assert_eq!(decoded.partition_key_table().len(), 17);
    assert_eq!(decoded.into_user_records().unwrap(), inputs);
    assert_eq!(record.user_records().unwrap(), inputs);
}

#[test]
fn size_is_monotonic_and_bounded() {
    let mut record = PhysicalRecord::new(4096).unwrap();
    let mut previous = record.size_bytes();

    for i in 0.. {
        let added = record
            .try_add(&format!("pk-{i}"), Bytes::from(vec![b'x'; 37]), None)
            .unwrap();
        if !added {
            break;
        }
        assert!(record.size_bytes() > previous);
        assert!(record.size_bytes() <= 4096);
        assert_eq!(record.to_bytes().len(), record.size_bytes());
        previous = record.size_bytes();
    }

    assert!(record.len() > 1);
}

#[test]
fn empty_record_is_framing_only() {
    let record = PhysicalRecord::default();
    let raw = record.to_bytes();
    assert_eq!(raw.len(), AGGREGATION_OVERHEAD);

    // No body, so the decoder refuses it
    assert!(matches!(decode_physical(raw, true), Err(Error::Truncated(20))));
}

// ---------------------------------------------------------------
// Size ceiling
// ---------------------------------------------------------------

#[test]
fn rejects_record_larger_than_default_ceiling() {
    let mut record = PhysicalRecord::default();
    let err = record
        .try_add("pk", Bytes::from(vec![0u8; 2 * MAX_BYTES_PER_RECORD]), None)
        .unwrap_err();
    assert!(matches!(err, Error::OversizedEntry { .. }));
}

#[test]
fn rejects_record_larger_than_configured_ceiling() {
    let mut record = PhysicalRecord::new(100 * 1024).unwrap();
    let err = record
        .try_add("pk", Bytes::from(vec![0u8; 200 * 1024]), None)
        .unwrap_err();
    assert!(matches!(err, Error::OversizedEntry { max, .. } if max == 100 * 1024));
    assert!(record.is_empty());
}

#[test]
fn second_large_record_reports_full() {
    let mut record = PhysicalRecord::new(300 * 1024).unwrap();
    assert!(record.try_add("pk", Bytes::from(vec![0u8; 200 * 1024]), None).unwrap());
    assert!(!record.try_add("pk", Bytes::from(vec![0u8; 200 * 1024]), None).unwrap());
    assert_eq!(record.len(), 1);
}

#[test]
fn rejects_ceiling_above_transport_limit() {
    assert!(matches!(
        PhysicalRecord::new(2 * MAX_BYTES_PER_RECORD),
        Err(Error::InvalidConfiguration(_))
    ));
}

#[test]
fn fills_to_exactly_the_ceiling() {
    // One 1-byte key, 1-byte payloads: table entry 3 bytes, each entry 7 bytes
    // (08 00 1a 01 xx wrapped in 1a 05). 20 + 3 + 7 * 12 = 107.
    let mut record = PhysicalRecord::new(107).unwrap();
    for _ in 0..12 {
        assert!(record.try_add("k", Bytes::from_static(b"v"), None).unwrap());
    }
    assert_eq!(record.size_bytes(), 107);
    assert!(!record.try_add("k", Bytes::from_static(b"v"), None).unwrap());
}

// ---------------------------------------------------------------
// Integrity
// ---------------------------------------------------------------

#[test]
fn tampered_body_fails_digest() {
    let record = pack(&kpl_inputs_no_ehks());
    let mut raw = record.to_bytes().to_vec();
    raw[10] ^= 0x01;

    assert!(matches!(
        decode_physical(Bytes::from(raw), true),
        Err(Error::DigestMismatch)
    ));
}
