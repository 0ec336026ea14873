//! The two model layers of the pipeline.
//!
//! The raw layer (`RawDoc`, `RawTypeDecl`, `RawMember`) is what the schema
//! document front-end and extraction produce: declaration order preserved,
//! every cross-member reference still an opaque name. The refined layer
//! (`SchemaType`, `SchemaMember`) is what refinement produces and what
//! validation and generation consume: indices instead of names, derived
//! widths computed, constructor contract decided. Generation never mutates
//! a refined type.

use std::collections::BTreeMap;

/// Fixed-width wire scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Bool,
}

impl Scalar {
    pub fn parse_named(name: &str) -> Option<Self> {
        match name {
            "u8" => Some(Scalar::U8),
            "i8" => Some(Scalar::I8),
            "u16" => Some(Scalar::U16),
            "i16" => Some(Scalar::I16),
            "u32" => Some(Scalar::U32),
            "i32" => Some(Scalar::I32),
            "u64" => Some(Scalar::U64),
            "i64" => Some(Scalar::I64),
            "f32" => Some(Scalar::F32),
            "f64" => Some(Scalar::F64),
            "bool" => Some(Scalar::Bool),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Scalar::U8 => "u8",
            Scalar::I8 => "i8",
            Scalar::U16 => "u16",
            Scalar::I16 => "i16",
            Scalar::U32 => "u32",
            Scalar::I32 => "i32",
            Scalar::U64 => "u64",
            Scalar::I64 => "i64",
            Scalar::F32 => "f32",
            Scalar::F64 => "f64",
            Scalar::Bool => "bool",
        }
    }

    pub fn width(self) -> usize {
        match self {
            Scalar::U8 | Scalar::I8 | Scalar::Bool => 1,
            Scalar::U16 | Scalar::I16 => 2,
            Scalar::U32 | Scalar::I32 | Scalar::F32 => 4,
            Scalar::U64 | Scalar::I64 | Scalar::F64 => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, Scalar::F32 | Scalar::F64 | Scalar::Bool)
    }

    /// The Rust type generated code stores this scalar as. Identical to the
    /// wire name by construction.
    pub fn rust_ty(self) -> &'static str {
        self.name()
    }
}

/// Default count representation for prefixed-count collections: a 4-byte
/// signed little-endian integer.
pub const DEFAULT_COUNT_TYPE: Scalar = Scalar::I32;

/// Default polymorphic tag representation when nothing else fixes it.
pub const DEFAULT_TAG_TYPE: Scalar = Scalar::I32;

/// A member's declared type, straight from the document.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Scalar(Scalar),
    Text,
    /// A schema type, enum, or polymorphic union referenced by name.
    Named(String),
    Vec(Box<TypeRef>),
    /// A pooled byte buffer with externally-owned backing storage.
    Pooled,
}

impl TypeRef {
    pub fn display_name(&self) -> String {
        match self {
            TypeRef::Scalar(s) => s.name().to_string(),
            TypeRef::Text => "string".to_string(),
            TypeRef::Named(n) => n.clone(),
            TypeRef::Vec(inner) => format!("vec<{}>", inner.display_name()),
            TypeRef::Pooled => "pooled".to_string(),
        }
    }
}

/// Polymorphic element handling for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolyMode {
    #[default]
    None,
    /// One tag governs the whole sequence; it must be homogeneous.
    SingleSharedTag,
    /// Every element carries its own tag.
    PerElementTag,
}

/// The tag's wire representation.
#[derive(Debug, Clone, PartialEq)]
pub enum TagType {
    Scalar(Scalar),
    /// A declared enum; tags travel as the enum's underlying representation.
    Enum { name: String, repr: Scalar },
}

impl TagType {
    pub fn repr(&self) -> Scalar {
        match self {
            TagType::Scalar(s) => *s,
            TagType::Enum { repr, .. } => *repr,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RawDoc {
    pub module: String,
    pub types: Vec<RawTypeDecl>,
    pub enums: Vec<EnumDecl>,
    pub default_codecs: Vec<DefaultCodec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub repr: Scalar,
    pub values: Vec<EnumValue>,
    pub ptr: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub name: String,
    pub value: i64,
}

/// Document-level `default_codecs` entry: every member of `target` type
/// uses `codec` unless the member declares its own.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultCodec {
    pub target: String,
    pub codec: String,
}

/// One type declaration as written, before base-chain flattening.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTypeDecl {
    pub name: String,
    pub base: Option<String>,
    pub is_value: bool,
    pub members: Vec<RawMember>,
    pub nested: Vec<RawTypeDecl>,
    pub ctors: Vec<RawCtor>,
    pub has_release: bool,
    pub needs_default: bool,
    pub ptr: String,
}

/// A host-declared constructor: ordered (name, declared type name) pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCtor {
    pub params: Vec<RawCtorParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawCtorParam {
    pub name: String,
    pub ty_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawMember {
    pub name: String,
    pub ty: TypeRef,
    pub collection: Option<RawCollection>,
    pub polymorphic: Option<RawPoly>,
    pub codec: Option<String>,
    pub readonly: bool,
    pub init_only: bool,
    pub ignored: bool,
    pub ptr: String,
}

/// Collection configuration as written. All count options are carried so
/// validation can flag conflicting combinations; refinement picks the
/// effective strategy by the fixed > reference > unbounded > prefixed
/// precedence only after validation has had its say.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawCollection {
    pub count_type: Option<Scalar>,
    pub fixed_count: Option<i64>,
    pub count_ref: Option<String>,
    pub unbounded: bool,
    pub mode: Option<PolyMode>,
    pub tag_property: Option<String>,
    pub tag_type: Option<TagType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawPoly {
    pub tag_property: Option<String>,
    pub tag_type: Option<TagType>,
    pub variants: Vec<RawVariant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawVariant {
    pub tag: i64,
    pub ty_name: String,
}

/// Extraction output: the flattened view of one annotated type. Members are
/// the concatenation of the base chain's members, base-first, each level in
/// declaration order; `ignored` members are dropped. References are still
/// names.
#[derive(Debug, Clone, PartialEq)]
pub struct RawType {
    pub name: String,
    pub is_value: bool,
    pub has_schema_base: bool,
    pub members: Vec<RawMember>,
    pub nested: Vec<RawType>,
    pub ctors: Vec<RawCtor>,
    pub has_release: bool,
    pub needs_default: bool,
    pub ptr: String,
}

// ---------------------------------------------------------------------------
// Refined layer
// ---------------------------------------------------------------------------

/// What a member's declared type resolved to within the document.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedKind {
    Scalar(Scalar),
    Text,
    /// A declared enum; travels as its repr.
    Enum { name: String, repr: Scalar },
    /// A declared schema type with its own generated triple.
    Schema(String),
    /// A polymorphic union named by the member's declared type.
    Union(String),
    Collection,
    Pooled,
    /// Named type with no matching declaration; validation reports it.
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaType {
    pub name: String,
    /// Generated module path, from the document's `module`.
    pub namespace: String,
    pub is_value: bool,
    pub has_schema_base: bool,
    pub members: Vec<SchemaMember>,
    pub nested: Vec<SchemaType>,
    pub ctor: CtorSpec,
    /// Owns pooled buffers, directly or transitively.
    pub needs_release: bool,
    /// Host already exposes a teardown; do not generate one.
    pub has_release: bool,
    pub ptr: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaMember {
    pub name: String,
    pub ty: TypeRef,
    pub kind: ResolvedKind,
    pub collection: Option<CollectionSpec>,
    pub polymorphic: Option<PolySpec>,
    pub codec: Option<CodecRef>,
    pub readonly: bool,
    pub init_only: bool,
    /// Declaration position in the flattened member list.
    pub position: usize,
    /// Back-link: this member carries the element count of member `i`.
    pub count_source_for: Option<usize>,
    /// Back-link: this member carries the discriminator of member `i`.
    pub discriminator_for: Option<usize>,
    pub ptr: String,
}

impl SchemaMember {
    pub fn immutable(&self) -> bool {
        self.readonly || self.init_only
    }
}

/// Reference to a custom codec type; all three operations delegate to it.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecRef {
    /// Rust path of the codec type, as written in the document.
    pub path: String,
}

/// The effective count strategy, exactly one per collection.
#[derive(Debug, Clone, PartialEq)]
pub enum CountStrategy {
    /// No count on the wire; encode checks the length, decode reads N.
    Fixed(usize),
    /// Count travels in the sibling member at this index.
    Reference(usize),
    /// Little-endian count of this width immediately before the elements.
    Prefixed(Scalar),
    /// No count; decode consumes the source to exhaustion.
    Unbounded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub elem: ElemDesc,
    /// Raw configuration retained for validation's conflict checks.
    pub raw: RawCollection,
    /// Unresolved when the named sibling does not exist.
    pub count_ref_index: Option<usize>,
    pub mode: PolyMode,
    pub tag_property_index: Option<usize>,
    /// Byte width of the effective count representation (0 for fixed,
    /// reference and unbounded strategies, which write no count).
    pub count_width: usize,
}

impl CollectionSpec {
    /// The single strategy driving all three emitted operations.
    pub fn strategy(&self) -> CountStrategy {
        if let Some(n) = self.raw.fixed_count {
            return CountStrategy::Fixed(n.max(0) as usize);
        }
        if self.raw.count_ref.is_some() {
            // Falls back to prefixed when unresolved, but validation blocks
            // generation before that matters.
            if let Some(idx) = self.count_ref_index {
                return CountStrategy::Reference(idx);
            }
        }
        if self.raw.unbounded {
            return CountStrategy::Unbounded;
        }
        CountStrategy::Prefixed(self.raw.count_type.unwrap_or(DEFAULT_COUNT_TYPE))
    }
}

/// Element descriptor for a collection or pooled buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ElemDesc {
    pub ty: TypeRef,
    pub kind: ResolvedKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolySpec {
    pub tag_property: Option<String>,
    pub tag_property_index: Option<usize>,
    pub tag_type: TagType,
    pub tag_width: usize,
    pub variants: Vec<Variant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub tag: i64,
    pub ty_name: String,
}

/// The constructor contract for one type.
#[derive(Debug, Clone, PartialEq)]
pub struct CtorSpec {
    pub params: Vec<CtorParam>,
    /// Emit the constructor (vs. reuse one the host already declares —
    /// either way decode routes through it).
    pub synthesize: bool,
    /// A parameterless construction path must exist as well.
    pub needs_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CtorParam {
    pub name: String,
    pub ty_name: String,
}

/// Everything refinement resolved at document scope: the declared type
/// table, enums, polymorphic unions, and default codecs. Shared read-only
/// by validation and generation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocContext {
    pub module: String,
    /// Declared schema type names (top-level and flattened nested).
    pub schema_types: BTreeMap<String, String>,
    pub enums: BTreeMap<String, EnumDecl>,
    /// Polymorphic unions keyed by the declaring member's type name.
    pub unions: BTreeMap<String, PolySpec>,
    pub default_codecs: BTreeMap<String, String>,
    /// Transitive pooled-buffer ownership per schema type, settled by the
    /// refinement fixpoint; generation consults it when emitting release
    /// calls into owned values.
    pub release_table: BTreeMap<String, bool>,
}

impl DocContext {
    pub fn is_schema_type(&self, name: &str) -> bool {
        self.schema_types.contains_key(name)
    }
}
