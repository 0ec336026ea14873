//! `encode` emission: writes exactly `size()` bytes or fails with an
//! invalid-operation error before writing anything structurally wrong.
//!
//! Members referenced as a count source or a discriminator are written
//! from a pre-pass local computed out of the authoritative value (the
//! collection's actual length, the union's runtime variant), never from
//! the stored sibling value.

use crate::compile::CompilerError;
use crate::emit::{put_count_method, put_method, Emitter};
use crate::model::{CountStrategy, PolyMode, PolySpec, ResolvedKind, SchemaMember, SchemaType};
use crate::names;
use crate::plan::{classify, classify_elem, ElemStrategy, Strategy};

impl Emitter<'_> {
    pub(crate) fn emit_encode_fn(&mut self, ty: &SchemaType) -> Result<(), CompilerError> {
        if ty.members.is_empty() {
            self.open("fn encode(&self, _w: &mut Writer) -> Result<(), EncodeError>");
            self.line("Ok(())");
            self.close();
            return Ok(());
        }

        self.open("fn encode(&self, w: &mut Writer) -> Result<(), EncodeError>");
        self.emit_sibling_prepass(ty)?;
        for m in &ty.members {
            self.emit_member_encode(ty, m)?;
        }
        self.line("Ok(())");
        self.close();
        Ok(())
    }

    /// One local per referenced sibling, named `<sibling>_wire`, holding
    /// the value its slot must carry on the wire.
    fn emit_sibling_prepass(&mut self, ty: &SchemaType) -> Result<(), CompilerError> {
        for target in &ty.members {
            let target_field = names::field_ident(&target.name);
            if let Some(i) = target.count_source_for {
                let coll = &ty.members[i];
                let coll_field = names::field_ident(&coll.name);
                let target_ty = self.scalar_ty_of(target)?;
                self.line(format!(
                    "let {target_field}_wire: {target_ty} = {target_ty}::try_from(self.{coll_field}.len()).map_err(|_| EncodeError::CountOverflow {{ member: {:?}, count: self.{coll_field}.len(), max: {target_ty}::MAX as u64 }})?;",
                    coll.name
                ));
            }
            if let Some(i) = target.discriminator_for {
                let poly_member = &ty.members[i];
                let poly_field = names::field_ident(&poly_member.name);
                let (union, spec) = self.union_of(poly_member)?;
                let repr = spec.tag_type.repr().rust_ty();
                match classify(poly_member) {
                    Strategy::PolyScalar => {
                        self.open(format!(
                            "let {target_field}_wire: {repr} = match &self.{poly_field}"
                        ));
                        for v in &spec.variants {
                            self.line(format!(
                                "Some({union}::{}(_)) => {},",
                                names::type_ident(&v.ty_name),
                                v.tag
                            ));
                        }
                        self.line("None => 0,");
                        self.close_with(";");
                    }
                    Strategy::Collection => {
                        let default_tag = spec
                            .variants
                            .first()
                            .map(|v| v.tag)
                            .ok_or_else(|| self.err(format!(
                                "polymorphic member {:?} has no variants at emission",
                                poly_member.name
                            )))?;
                        self.open(format!(
                            "let {target_field}_wire: {repr} = match self.{poly_field}.first()"
                        ));
                        for v in &spec.variants {
                            self.line(format!(
                                "Some({union}::{}(_)) => {},",
                                names::type_ident(&v.ty_name),
                                v.tag
                            ));
                        }
                        self.line(format!("None => {default_tag},"));
                        self.close_with(";");
                    }
                    _ => {
                        return Err(self.err(format!(
                            "member {:?} binds a discriminator but is not polymorphic",
                            poly_member.name
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    fn emit_member_encode(&mut self, ty: &SchemaType, m: &SchemaMember) -> Result<(), CompilerError> {
        let field = names::field_ident(&m.name);
        let referenced = m.count_source_for.is_some() || m.discriminator_for.is_some();
        match classify(m) {
            Strategy::Scalar => {
                let ResolvedKind::Scalar(s) = &m.kind else {
                    return Err(self.err(format!("member {:?} classified scalar without one", m.name)));
                };
                if referenced {
                    self.line(format!("w.{}({field}_wire);", put_method(*s)));
                } else {
                    self.line(format!("w.{}(self.{field});", put_method(*s)));
                }
            }
            Strategy::Enum => {
                let ResolvedKind::Enum { repr, .. } = &m.kind else {
                    return Err(self.err(format!("member {:?} classified enum without one", m.name)));
                };
                if referenced {
                    self.line(format!("w.{}({field}_wire);", put_method(*repr)));
                } else {
                    self.line(format!(
                        "w.{}(self.{field} as {});",
                        put_method(*repr),
                        repr.rust_ty()
                    ));
                }
            }
            Strategy::Text => self.line(format!("w.put_str(&self.{field});")),
            Strategy::Nested => self.line(format!("self.{field}.encode(w)?;")),
            Strategy::Custom => {
                let codec = self.codec_of(m)?;
                self.line(format!(
                    "codecs::{}().encode_field(&self.{field}, w)?;",
                    names::path_ident(&codec.path)
                ));
            }
            Strategy::Pooled => self.emit_pooled_encode(m, &field)?,
            Strategy::PolyScalar => self.emit_poly_scalar_encode(ty, m, &field)?,
            Strategy::Collection => self.emit_collection_encode(ty, m, &field)?,
        }
        Ok(())
    }

    fn emit_pooled_encode(&mut self, m: &SchemaMember, field: &str) -> Result<(), CompilerError> {
        let spec = self.collection_of(m)?;
        match spec.strategy() {
            CountStrategy::Fixed(n) => {
                self.emit_fixed_len_check(&m.name, field, n, ".len()");
            }
            CountStrategy::Prefixed(ct) => {
                self.line(format!(
                    "w.{}({:?}, self.{field}.len())?;",
                    put_count_method(ct),
                    m.name
                ));
            }
            // Reference: the sibling slot carries the count. Unbounded is
            // validated out for pooled members.
            CountStrategy::Reference(_) | CountStrategy::Unbounded => {}
        }
        self.line(format!("w.put_bytes(self.{field}.as_slice());"));
        Ok(())
    }

    fn emit_fixed_len_check(&mut self, member: &str, field: &str, n: usize, len: &str) {
        self.open(format!("if self.{field}{len} != {n}"));
        self.line(format!(
            "return Err(EncodeError::FixedCountMismatch {{ member: {member:?}, expected: {n}, actual: self.{field}{len} }});"
        ));
        self.close();
    }

    fn emit_poly_scalar_encode(
        &mut self,
        _ty: &SchemaType,
        m: &SchemaMember,
        field: &str,
    ) -> Result<(), CompilerError> {
        let (union, spec) = self.union_of(m)?;
        if spec.tag_property_index.is_some() {
            // Tag travels in the sibling slot; only the payload is written
            // here, and an absent value writes nothing at all.
            self.open(format!("if let Some(value) = &self.{field}"));
            self.open("match value");
            for v in &spec.variants {
                self.line(format!(
                    "{union}::{}(v) => v.encode(w)?,",
                    names::type_ident(&v.ty_name)
                ));
            }
            self.close();
            self.close();
        } else {
            let put_tag = put_method(spec.tag_type.repr());
            self.open(format!("match &self.{field}"));
            for v in &spec.variants {
                self.open(format!(
                    "Some({union}::{}(v)) =>",
                    names::type_ident(&v.ty_name)
                ));
                self.line(format!("w.{put_tag}({});", v.tag));
                self.line("v.encode(w)?;");
                self.close();
            }
            self.line(format!("None => w.{put_tag}(0),"));
            self.close();
        }
        Ok(())
    }

    fn emit_collection_encode(
        &mut self,
        ty: &SchemaType,
        m: &SchemaMember,
        field: &str,
    ) -> Result<(), CompilerError> {
        let spec = self.collection_of(m)?;
        match spec.strategy() {
            CountStrategy::Fixed(n) => self.emit_fixed_len_check(&m.name, field, n, ".len()"),
            CountStrategy::Prefixed(ct) => self.line(format!(
                "w.{}({:?}, self.{field}.len())?;",
                put_count_method(ct),
                m.name
            )),
            CountStrategy::Reference(_) | CountStrategy::Unbounded => {}
        }

        match spec.mode {
            PolyMode::SingleSharedTag => {
                let (union, poly) = self.union_of(m)?;
                let tag_local = self.shared_tag_local(ty, m, field, &union, poly)?;
                self.open(format!(
                    "for (index, item) in self.{field}.iter().enumerate()"
                ));
                self.open(format!("match ({tag_local}, item)"));
                for v in &poly.variants {
                    self.line(format!(
                        "({}, {union}::{}(v)) => v.encode(w)?,",
                        v.tag,
                        names::type_ident(&v.ty_name)
                    ));
                }
                self.line(format!(
                    "_ => return Err(EncodeError::HeterogeneousSequence {{ member: {:?}, index }}),",
                    m.name
                ));
                self.close();
                self.close();
            }
            PolyMode::PerElementTag => {
                let (union, poly) = self.union_of(m)?;
                let put_tag = put_method(poly.tag_type.repr());
                self.open(format!("for item in &self.{field}"));
                self.open("match item");
                for v in &poly.variants {
                    self.open(format!("{union}::{}(v) =>", names::type_ident(&v.ty_name)));
                    self.line(format!("w.{put_tag}({});", v.tag));
                    self.line("v.encode(w)?;");
                    self.close();
                }
                self.close();
                self.close();
            }
            PolyMode::None => match classify_elem(m) {
                ElemStrategy::ByteBlock => self.line(format!("w.put_bytes(&self.{field});")),
                ElemStrategy::Scalar(s) => {
                    self.open(format!("for item in &self.{field}"));
                    self.line(format!("w.{}(*item);", put_method(s)));
                    self.close();
                }
                ElemStrategy::Enum => {
                    let ResolvedKind::Enum { repr, .. } = &spec.elem.kind else {
                        return Err(self.err(format!(
                            "collection {:?} classified enum elements without an enum",
                            m.name
                        )));
                    };
                    self.open(format!("for item in &self.{field}"));
                    self.line(format!(
                        "w.{}(*item as {});",
                        put_method(*repr),
                        repr.rust_ty()
                    ));
                    self.close();
                }
                ElemStrategy::Text => {
                    self.open(format!("for item in &self.{field}"));
                    self.line("w.put_str(item);");
                    self.close();
                }
                ElemStrategy::Nested => {
                    self.open(format!("for item in &self.{field}"));
                    self.line("item.encode(w)?;");
                    self.close();
                }
                ElemStrategy::Union => {
                    return Err(self.err(format!(
                        "collection {:?} has union elements without a polymorphic mode",
                        m.name
                    )))
                }
            },
        }
        Ok(())
    }

    /// The expression holding a shared-tag sequence's one tag: either the
    /// sibling's pre-pass local, or a fresh local derived from the first
    /// element (and written inline, since no sibling slot carries it).
    fn shared_tag_local(
        &mut self,
        ty: &SchemaType,
        m: &SchemaMember,
        field: &str,
        union: &str,
        poly: &PolySpec,
    ) -> Result<String, CompilerError> {
        if let Some(t) = poly.tag_property_index {
            let target_field = names::field_ident(&ty.members[t].name);
            return Ok(format!("{target_field}_wire"));
        }
        let default_tag = poly
            .variants
            .first()
            .map(|v| v.tag)
            .ok_or_else(|| self.err(format!("polymorphic member {:?} has no variants", m.name)))?;
        let repr = poly.tag_type.repr();
        self.open(format!(
            "let {field}_tag: {} = match self.{field}.first()",
            repr.rust_ty()
        ));
        for v in &poly.variants {
            self.line(format!(
                "Some({union}::{}(_)) => {},",
                names::type_ident(&v.ty_name),
                v.tag
            ));
        }
        self.line(format!("None => {default_tag},"));
        self.close_with(";");
        self.line(format!("w.{}({field}_tag);", put_method(repr)));
        Ok(format!("{field}_tag"))
    }

    fn scalar_ty_of(&self, m: &SchemaMember) -> Result<&'static str, CompilerError> {
        match &m.kind {
            ResolvedKind::Scalar(s) => Ok(s.rust_ty()),
            ResolvedKind::Enum { repr, .. } => Ok(repr.rust_ty()),
            _ => Err(self.err(format!(
                "member {:?} is referenced as a wire slot but is not scalar",
                m.name
            ))),
        }
    }
}
