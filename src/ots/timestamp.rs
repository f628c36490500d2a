//! Canonical commitment tree
//!
//! The `opentimestamps` crate models a proof as a chain of steps with
//! explicit forks, in whatever order the bytes listed them. Merging
//! calendar fragments and grafting upgrades is simpler on a tree where each
//! node holds its attestations and one child per operation, both kept
//! sorted. Two trees with the same content then encode to the same bytes.

use opentimestamps::attestation::Attestation;
use opentimestamps::op::Op;
use opentimestamps::timestamp::{Step, StepData, Timestamp as WireTimestamp};

use super::attestation::{cmp_attestations, is_settled};
use super::codec::CodecError;
use super::op::{apply, cmp_ops};

/// Commitment tree rooted at `msg`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    pub msg: Vec<u8>,
    attestations: Vec<Attestation>,
    ops: Vec<(Op, Timestamp)>,
}

/// A pending attestation and where it sits in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLeaf {
    /// Operations from the root to the attested node
    pub path: Vec<Op>,
    /// Calendar that issued the attestation
    pub uri: String,
    /// Message the calendar committed to
    pub commitment: Vec<u8>,
}

impl Timestamp {
    pub fn new(msg: Vec<u8>) -> Self {
        Self {
            msg,
            attestations: Vec::new(),
            ops: Vec::new(),
        }
    }

    /// Convert the crate's step chain into a canonical tree
    pub fn from_wire(wire: WireTimestamp) -> Result<Self, CodecError> {
        let mut root = Timestamp::new(wire.start_digest);
        root.absorb(wire.first_step)?;
        Ok(root)
    }

    fn absorb(&mut self, step: Step) -> Result<(), CodecError> {
        match step.data {
            StepData::Attestation(attestation) => {
                self.attest(attestation);
            }
            StepData::Fork => {
                for next in step.next {
                    self.absorb(next)?;
                }
            }
            StepData::Op(op) => {
                let child = self.add_op(op)?;
                for next in step.next {
                    child.absorb(next)?;
                }
            }
        }
        Ok(())
    }

    /// Step chain for the crate's serializer
    pub fn to_wire(&self) -> Result<WireTimestamp, CodecError> {
        Ok(WireTimestamp {
            start_digest: self.msg.clone(),
            first_step: self.to_step()?,
        })
    }

    fn to_step(&self) -> Result<Step, CodecError> {
        let mut items = Vec::with_capacity(self.attestations.len() + self.ops.len());
        for attestation in &self.attestations {
            items.push(Step {
                data: StepData::Attestation(attestation.clone()),
                output: self.msg.clone(),
                next: vec![],
            });
        }
        for (op, child) in &self.ops {
            items.push(Step {
                data: StepData::Op(op.clone()),
                output: child.msg.clone(),
                next: vec![child.to_step()?],
            });
        }

        match items.len() {
            0 => Err(CodecError::EmptyTimestamp),
            1 => items.pop().ok_or(CodecError::EmptyTimestamp),
            _ => Ok(Step {
                data: StepData::Fork,
                output: self.msg.clone(),
                next: items,
            }),
        }
    }

    pub fn attestations(&self) -> impl Iterator<Item = &Attestation> {
        self.attestations.iter()
    }

    pub fn ops(&self) -> impl Iterator<Item = (&Op, &Timestamp)> {
        self.ops.iter().map(|(op, child)| (op, child))
    }

    /// Child reached through `op`
    pub fn child(&self, op: &Op) -> Option<&Timestamp> {
        self.ops.iter().find(|(o, _)| o == op).map(|(_, child)| child)
    }

    /// Add an attestation to this node; `false` if it was already there
    pub fn attest(&mut self, attestation: Attestation) -> bool {
        match self
            .attestations
            .binary_search_by(|a| cmp_attestations(a, &attestation))
        {
            Ok(_) => false,
            Err(pos) => {
                self.attestations.insert(pos, attestation);
                true
            }
        }
    }

    /// Remove an attestation from this node; `false` if it was not there
    pub fn remove_attestation(&mut self, attestation: &Attestation) -> bool {
        match self
            .attestations
            .binary_search_by(|a| cmp_attestations(a, attestation))
        {
            Ok(pos) => {
                self.attestations.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Put `child` under `op` without recomputing its message
    ///
    /// Replaces any existing child for `op`. Trees built this way are only
    /// trustworthy after [`super::commitment::replay`].
    pub fn set_child(&mut self, op: Op, child: Timestamp) {
        match self.ops.binary_search_by(|(o, _)| cmp_ops(o, &op)) {
            Ok(pos) => self.ops[pos].1 = child,
            Err(pos) => self.ops.insert(pos, (op, child)),
        }
    }

    /// Follow (or create) the edge for `op`, returning the child node
    pub fn add_op(&mut self, op: Op) -> Result<&mut Timestamp, CodecError> {
        let pos = match self.ops.binary_search_by(|(o, _)| cmp_ops(o, &op)) {
            Ok(pos) => pos,
            Err(pos) => {
                let result = apply(&op, &self.msg)?;
                self.ops.insert(pos, (op, Timestamp::new(result)));
                pos
            }
        };
        Ok(&mut self.ops[pos].1)
    }

    /// Union `other` into this tree
    ///
    /// Both trees must be rooted at the same message. Nothing already present
    /// is removed.
    pub fn merge(&mut self, other: Timestamp) -> Result<(), CodecError> {
        if self.msg != other.msg {
            return Err(CodecError::MessageMismatch);
        }
        for attestation in other.attestations {
            self.attest(attestation);
        }
        for (op, child) in other.ops {
            match self.ops.binary_search_by(|(o, _)| cmp_ops(o, &op)) {
                Ok(pos) => self.ops[pos].1.merge(child)?,
                Err(pos) => self.ops.insert(pos, (op, child)),
            }
        }
        Ok(())
    }

    /// Every attestation in the tree with the message it attests
    pub fn all_attestations(&self) -> Vec<(&[u8], &Attestation)> {
        let mut out = Vec::new();
        self.collect_attestations(&mut out);
        out
    }

    fn collect_attestations<'a>(&'a self, out: &mut Vec<(&'a [u8], &'a Attestation)>) {
        for attestation in &self.attestations {
            out.push((self.msg.as_slice(), attestation));
        }
        for (_, child) in &self.ops {
            child.collect_attestations(out);
        }
    }

    /// Number of branches, i.e. attestation leaves
    pub fn branch_count(&self) -> usize {
        self.attestations.len() + self.ops.iter().map(|(_, c)| c.branch_count()).sum::<usize>()
    }

    /// Whether any branch ends in a settled attestation
    pub fn is_settled(&self) -> bool {
        self.attestations.iter().any(is_settled) || self.ops.iter().any(|(_, c)| c.is_settled())
    }

    /// Pending attestations in tree order
    pub fn pending_leaves(&self) -> Vec<PendingLeaf> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        self.collect_pending(&mut path, &mut out);
        out
    }

    fn collect_pending(&self, path: &mut Vec<Op>, out: &mut Vec<PendingLeaf>) {
        for attestation in &self.attestations {
            if let Attestation::Pending { uri } = attestation {
                out.push(PendingLeaf {
                    path: path.clone(),
                    uri: uri.clone(),
                    commitment: self.msg.clone(),
                });
            }
        }
        for (op, child) in &self.ops {
            path.push(op.clone());
            child.collect_pending(path, out);
            path.pop();
        }
    }

    /// Node reached by following `path` from the root
    pub fn node_at_mut(&mut self, path: &[Op]) -> Option<&mut Timestamp> {
        match path.split_first() {
            None => Some(self),
            Some((op, rest)) => self
                .ops
                .iter_mut()
                .find(|(o, _)| o == op)?
                .1
                .node_at_mut(rest),
        }
    }
}
