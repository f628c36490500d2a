//! Attestation helpers over the `opentimestamps` crate's `Attestation`

use opentimestamps::attestation::Attestation;
use std::cmp::Ordering;

/// Bitcoin block header attestation at `height`
pub fn bitcoin(height: u64) -> Attestation {
    Attestation::Bitcoin {
        height: height as _,
    }
}

/// Block height of a Bitcoin attestation
pub fn bitcoin_height(attestation: &Attestation) -> Option<u64> {
    match attestation {
        Attestation::Bitcoin { height } => Some(*height as u64),
        _ => None,
    }
}

/// Settled attestations make a claim about a point in time
pub fn is_settled(attestation: &Attestation) -> bool {
    matches!(attestation, Attestation::Bitcoin { .. })
}

pub fn is_pending(attestation: &Attestation) -> bool {
    matches!(attestation, Attestation::Pending { .. })
}

fn sort_key(attestation: &Attestation) -> (u8, Vec<u8>) {
    match attestation {
        Attestation::Bitcoin { height } => (0, (*height as u64).to_be_bytes().to_vec()),
        Attestation::Pending { uri } => (1, uri.as_bytes().to_vec()),
        Attestation::Unknown { tag, data } => (2, [tag.as_slice(), data.as_slice()].concat()),
    }
}

/// Bitcoin before pending before unknown, then by payload
pub(crate) fn cmp_attestations(a: &Attestation, b: &Attestation) -> Ordering {
    sort_key(a).cmp(&sort_key(b))
}

pub fn describe(attestation: &Attestation) -> String {
    match attestation {
        Attestation::Pending { uri } => format!("PendingAttestation('{uri}')"),
        Attestation::Bitcoin { height } => format!("BitcoinBlockHeaderAttestation({height})"),
        Attestation::Unknown { tag, data } => format!(
            "UnknownAttestation({}, {})",
            hex::encode(tag),
            hex::encode(data)
        ),
    }
}
