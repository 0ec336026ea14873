//! Wire-strategy planning.
//!
//! Exactly one strategy is selected per member, once, and the three
//! emission paths all consume the same plan. Size, encode and decode can
//! therefore only disagree if a single strategy's three arms disagree,
//! which is what the emitter unit tests pin down.
//!
//! Per member the classification walks
//! `Unclassified -> {Custom | PolyScalar | Collection | Pooled | Text |
//! Enum | Scalar | Nested}` with collection sub-states for the count
//! strategy and the polymorphic mode; the emitters refuse to run on an
//! unvalidated model, so every reachable state here is well-formed.

use crate::model::{PolyMode, ResolvedKind, Scalar, SchemaMember, SchemaType};

/// The selected strategy for one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// All three operations delegate to the member's custom codec.
    Custom,
    /// Tagged union in scalar position (`Option<Union>` field).
    PolyScalar,
    /// Any `vec<...>` member, including polymorphic element modes.
    Collection,
    /// Pooled byte buffer with leased backing storage.
    Pooled,
    Text,
    /// Declared enum; travels as its underlying representation.
    Enum,
    Scalar,
    /// Nested schema type delegating to its own generated triple.
    Nested,
}

/// How a collection's elements are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemStrategy {
    /// Contiguous byte elements: one block copy for the whole run.
    ByteBlock,
    /// Fixed-width scalars other than bytes: per-element primitive loop.
    Scalar(Scalar),
    Enum,
    Text,
    /// Elements with their own generated triple.
    Nested,
    /// Per-element or shared-tag union elements.
    Union,
}

/// Classifies one member. The custom-codec check comes first: a codec
/// short-circuits every other axis.
pub fn classify(member: &SchemaMember) -> Strategy {
    if member.codec.is_some() {
        return Strategy::Custom;
    }
    match &member.kind {
        ResolvedKind::Union(_) => Strategy::PolyScalar,
        ResolvedKind::Collection => Strategy::Collection,
        ResolvedKind::Pooled => Strategy::Pooled,
        ResolvedKind::Text => Strategy::Text,
        ResolvedKind::Enum { .. } => Strategy::Enum,
        ResolvedKind::Scalar(_) => Strategy::Scalar,
        ResolvedKind::Schema(_) => Strategy::Nested,
        // Validation rejects unknowns before generation runs; classifying
        // them as nested keeps this total without a panic path.
        ResolvedKind::Unknown(_) => Strategy::Nested,
    }
}

/// Classifies a collection's element handling. Only meaningful for
/// `Strategy::Collection` members.
pub fn classify_elem(member: &SchemaMember) -> ElemStrategy {
    let Some(coll) = &member.collection else {
        return ElemStrategy::ByteBlock;
    };
    if coll.mode != PolyMode::None {
        return ElemStrategy::Union;
    }
    match &coll.elem.kind {
        ResolvedKind::Scalar(Scalar::U8) => ElemStrategy::ByteBlock,
        ResolvedKind::Scalar(s) => ElemStrategy::Scalar(*s),
        ResolvedKind::Enum { .. } => ElemStrategy::Enum,
        ResolvedKind::Text => ElemStrategy::Text,
        _ => ElemStrategy::Nested,
    }
}

/// Plans every member of a type. The result is positional: `plan(ty)[i]`
/// is the strategy for `ty.members[i]`.
pub fn plan_members(ty: &SchemaType) -> Vec<Strategy> {
    ty.members.iter().map(classify).collect()
}
