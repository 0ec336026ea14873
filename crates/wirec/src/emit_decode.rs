//! `decode` emission: reads members into locals in declaration order (so a
//! count or tag sibling is always available before the member that needs
//! it), then builds the value through the constructor contract.

use crate::compile::CompilerError;
use crate::emit::{member_by_ctor_name, take_count_method, take_method, Emitter};
use crate::model::{
    CountStrategy, PolyMode, PolySpec, ResolvedKind, SchemaMember, SchemaType, TypeRef,
};
use crate::names;
use crate::plan::{classify, classify_elem, ElemStrategy, Strategy};

impl Emitter<'_> {
    pub(crate) fn emit_decode_fn(&mut self, ty: &SchemaType) -> Result<(), CompilerError> {
        let type_name = names::type_ident(&ty.name);
        if ty.members.is_empty() {
            self.open(format!(
                "fn decode(_r: &mut Reader<'_>) -> Result<{type_name}, DecodeError>"
            ));
            self.line(format!("Ok({type_name}::new())"));
            self.close();
            return Ok(());
        }

        self.open(format!(
            "fn decode(r: &mut Reader<'_>) -> Result<{type_name}, DecodeError>"
        ));
        for m in &ty.members {
            self.emit_member_decode(ty, m)?;
        }

        let args = ty
            .ctor
            .params
            .iter()
            .filter_map(|p| member_by_ctor_name(ty, &p.name))
            .map(|m| names::field_ident(&m.name))
            .collect::<Vec<_>>()
            .join(", ");
        self.line(format!("Ok({type_name}::new({args}))"));
        self.close();
        Ok(())
    }

    fn emit_member_decode(&mut self, ty: &SchemaType, m: &SchemaMember) -> Result<(), CompilerError> {
        let field = names::field_ident(&m.name);
        match classify(m) {
            Strategy::Scalar => {
                let ResolvedKind::Scalar(s) = &m.kind else {
                    return Err(self.err(format!("member {:?} classified scalar without one", m.name)));
                };
                self.line(format!("let {field} = r.{}()?;", take_method(*s)));
            }
            Strategy::Enum => {
                let ResolvedKind::Enum { name, repr } = &m.kind else {
                    return Err(self.err(format!("member {:?} classified enum without one", m.name)));
                };
                self.line(format!(
                    "let {field} = {}::from_wire(r.{}()? as i64)?;",
                    names::type_ident(name),
                    take_method(*repr)
                ));
            }
            Strategy::Text => {
                self.line(format!("let {field} = r.take_str({:?})?;", m.name));
            }
            Strategy::Nested => {
                let ResolvedKind::Schema(name) = &m.kind else {
                    return Err(self.err(format!("member {:?} classified nested without a type", m.name)));
                };
                self.line(format!(
                    "let {field} = {}::decode(r)?;",
                    names::type_ident(name)
                ));
            }
            Strategy::Custom => {
                let codec = self.codec_of(m)?;
                let fty = self.member_field_ty(m)?;
                self.line(format!(
                    "let {field}: {fty} = codecs::{}().decode_field(r)?;",
                    names::path_ident(&codec.path)
                ));
            }
            Strategy::Pooled => {
                self.emit_count_local(ty, m, &field)?;
                self.line(format!(
                    "let {field} = PooledBuf::from_slice(r.take_bytes({field}_len, {:?})?);",
                    m.name
                ));
            }
            Strategy::PolyScalar => self.emit_poly_scalar_decode(ty, m, &field)?,
            Strategy::Collection => self.emit_collection_decode(ty, m, &field)?,
        }
        Ok(())
    }

    /// Emits `let <field>_len = ...;` for every counted strategy. Unbounded
    /// collections have no length ahead of time and emit nothing.
    fn emit_count_local(
        &mut self,
        ty: &SchemaType,
        m: &SchemaMember,
        field: &str,
    ) -> Result<(), CompilerError> {
        let spec = self.collection_of(m)?;
        match spec.strategy() {
            CountStrategy::Fixed(n) => self.line(format!("let {field}_len = {n}usize;")),
            CountStrategy::Prefixed(ct) => self.line(format!(
                "let {field}_len = r.{}({:?})?;",
                take_count_method(ct),
                m.name
            )),
            CountStrategy::Reference(t) => {
                let target = &ty.members[t];
                let target_field = names::field_ident(&target.name);
                self.line(format!(
                    "let {field}_len = usize::try_from({target_field}).map_err(|_| DecodeError::NegativeCount {{ member: {:?}, count: {target_field} as i64 }})?;",
                    m.name
                ));
            }
            CountStrategy::Unbounded => {}
        }
        Ok(())
    }

    fn emit_poly_scalar_decode(
        &mut self,
        ty: &SchemaType,
        m: &SchemaMember,
        field: &str,
    ) -> Result<(), CompilerError> {
        let (union, spec) = self.union_of(m)?;
        self.emit_tag_local(ty, spec, field)?;
        self.open(format!("let {field} = match {field}_tag"));
        self.line("0 => None,");
        for v in &spec.variants {
            let variant = names::type_ident(&v.ty_name);
            self.line(format!(
                "{} => Some({union}::{variant}({variant}::decode(r)?)),",
                v.tag
            ));
        }
        self.line(format!(
            "other => return Err(DecodeError::UnknownTag {{ member: {:?}, tag: other as i64 }}),",
            m.name
        ));
        self.close_with(";");
        Ok(())
    }

    /// `let <field>_tag = ...;` — read inline, or taken from the already
    /// decoded sibling local (cast to the wire representation for enum
    /// siblings).
    fn emit_tag_local(
        &mut self,
        ty: &SchemaType,
        spec: &PolySpec,
        field: &str,
    ) -> Result<(), CompilerError> {
        match spec.tag_property_index {
            Some(t) => {
                let target = &ty.members[t];
                let target_field = names::field_ident(&target.name);
                match &target.kind {
                    ResolvedKind::Enum { repr, .. } => self.line(format!(
                        "let {field}_tag = {target_field} as {};",
                        repr.rust_ty()
                    )),
                    _ => self.line(format!("let {field}_tag = {target_field};")),
                }
            }
            None => self.line(format!(
                "let {field}_tag = r.{}()?;",
                take_method(spec.tag_type.repr())
            )),
        }
        Ok(())
    }

    fn emit_collection_decode(
        &mut self,
        ty: &SchemaType,
        m: &SchemaMember,
        field: &str,
    ) -> Result<(), CompilerError> {
        let spec = self.collection_of(m)?;
        let strategy = spec.strategy();
        let unbounded = matches!(strategy, CountStrategy::Unbounded);
        self.emit_count_local(ty, m, field)?;

        match spec.mode {
            PolyMode::SingleSharedTag => {
                let (union, poly) = self.union_of(m)?;
                self.emit_tag_local(ty, poly, field)?;
                self.line(format!(
                    "let mut {field} = Vec::with_capacity({field}_len.min(wirec_rt::MAX_COUNT_PREALLOC));"
                ));
                self.open(format!("match {field}_tag"));
                for v in &poly.variants {
                    let variant = names::type_ident(&v.ty_name);
                    self.open(format!("{} =>", v.tag));
                    self.open(format!("for _ in 0..{field}_len"));
                    self.line(format!("{field}.push({union}::{variant}({variant}::decode(r)?));"));
                    self.close();
                    self.close();
                }
                self.line(format!(
                    "other => return Err(DecodeError::UnknownTag {{ member: {:?}, tag: other as i64 }}),",
                    m.name
                ));
                self.close();
            }
            PolyMode::PerElementTag => {
                let (union, poly) = self.union_of(m)?;
                let take_tag = take_method(poly.tag_type.repr());
                if unbounded {
                    self.line(format!("let mut {field} = Vec::new();"));
                    self.open("while !r.is_empty()");
                } else {
                    self.line(format!(
                        "let mut {field} = Vec::with_capacity({field}_len.min(wirec_rt::MAX_COUNT_PREALLOC));"
                    ));
                    self.open(format!("for _ in 0..{field}_len"));
                }
                self.line(format!("let tag = r.{take_tag}()?;"));
                self.open(format!("{field}.push(match tag"));
                for v in &poly.variants {
                    let variant = names::type_ident(&v.ty_name);
                    self.line(format!(
                        "{} => {union}::{variant}({variant}::decode(r)?),",
                        v.tag
                    ));
                }
                self.line(format!(
                    "other => return Err(DecodeError::UnknownTag {{ member: {:?}, tag: other as i64 }}),",
                    m.name
                ));
                self.close_with(");");
                self.close();
            }
            PolyMode::None => match classify_elem(m) {
                ElemStrategy::ByteBlock => {
                    if unbounded {
                        self.line(format!(
                            "let {field} = r.take_bytes(r.remaining(), {:?})?.to_vec();",
                            m.name
                        ));
                    } else {
                        self.line(format!(
                            "let {field} = r.take_bytes({field}_len, {:?})?.to_vec();",
                            m.name
                        ));
                    }
                }
                other => {
                    let elem_expr = self.elem_decode_expr(m, &other)?;
                    if unbounded {
                        self.line(format!("let mut {field} = Vec::new();"));
                        self.open("while !r.is_empty()");
                    } else {
                        self.line(format!(
                            "let mut {field} = Vec::with_capacity({field}_len.min(wirec_rt::MAX_COUNT_PREALLOC));"
                        ));
                        self.open(format!("for _ in 0..{field}_len"));
                    }
                    self.line(format!("{field}.push({elem_expr});"));
                    self.close();
                }
            },
        }
        Ok(())
    }

    fn elem_decode_expr(
        &self,
        m: &SchemaMember,
        strategy: &ElemStrategy,
    ) -> Result<String, CompilerError> {
        let spec = self.collection_of(m)?;
        Ok(match strategy {
            ElemStrategy::Scalar(s) => format!("r.{}()?", take_method(*s)),
            ElemStrategy::Enum => {
                let ResolvedKind::Enum { name, repr } = &spec.elem.kind else {
                    return Err(self.err(format!(
                        "collection {:?} classified enum elements without an enum",
                        m.name
                    )));
                };
                format!(
                    "{}::from_wire(r.{}()? as i64)?",
                    names::type_ident(name),
                    take_method(*repr)
                )
            }
            ElemStrategy::Text => format!("r.take_str({:?})?", m.name),
            ElemStrategy::Nested => {
                let name = match &spec.elem.kind {
                    ResolvedKind::Schema(n) => n.clone(),
                    _ => match &spec.elem.ty {
                        TypeRef::Named(n) => n.clone(),
                        other => other.display_name(),
                    },
                };
                format!("{}::decode(r)?", names::type_ident(&name))
            }
            ElemStrategy::ByteBlock | ElemStrategy::Union => {
                return Err(self.err(format!(
                    "collection {:?} reached the element loop with a block or union strategy",
                    m.name
                )))
            }
        })
    }
}
