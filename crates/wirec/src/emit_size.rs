//! `size` emission: exact encoded byte length, no side effects.

use crate::compile::CompilerError;
use crate::emit::{field_ty, Emitter};
use crate::model::{CountStrategy, PolyMode, ResolvedKind, SchemaMember, SchemaType};
use crate::names;
use crate::plan::{classify, classify_elem, ElemStrategy, Strategy};

impl Emitter<'_> {
    pub(crate) fn emit_size_fn(&mut self, ty: &SchemaType) -> Result<(), CompilerError> {
        if ty.members.is_empty() {
            self.open("fn size(&self) -> usize");
            self.line("0");
            self.close();
            return Ok(());
        }

        self.open("fn size(&self) -> usize");
        self.line("let mut size = 0usize;");
        for m in &ty.members {
            self.emit_member_size(m)?;
        }
        self.line("size");
        self.close();
        Ok(())
    }

    fn emit_member_size(&mut self, m: &SchemaMember) -> Result<(), CompilerError> {
        let field = names::field_ident(&m.name);
        match classify(m) {
            Strategy::Scalar => {
                let ResolvedKind::Scalar(s) = &m.kind else {
                    return Err(self.err(format!("member {:?} classified scalar without one", m.name)));
                };
                self.line(format!("size += {}; // {field}", s.width()));
            }
            Strategy::Enum => {
                let ResolvedKind::Enum { repr, .. } = &m.kind else {
                    return Err(self.err(format!("member {:?} classified enum without one", m.name)));
                };
                self.line(format!("size += {}; // {field}", repr.width()));
            }
            Strategy::Text => {
                self.line(format!("size += 4 + self.{field}.len();"));
            }
            Strategy::Nested => {
                self.line(format!("size += self.{field}.size();"));
            }
            Strategy::Custom => {
                let codec = self.codec_of(m)?;
                self.line(format!(
                    "size += codecs::{}().field_size(&self.{field});",
                    names::path_ident(&codec.path)
                ));
            }
            Strategy::Pooled => {
                let spec = self.collection_of(m)?;
                match spec.strategy() {
                    CountStrategy::Prefixed(ct) => self.line(format!(
                        "size += {} + self.{field}.len();",
                        ct.width()
                    )),
                    _ => self.line(format!("size += self.{field}.len();")),
                }
            }
            Strategy::PolyScalar => self.emit_poly_scalar_size(m, &field)?,
            Strategy::Collection => self.emit_collection_size(m, &field)?,
        }
        Ok(())
    }

    fn emit_poly_scalar_size(&mut self, m: &SchemaMember, field: &str) -> Result<(), CompilerError> {
        let (union, spec) = self.union_of(m)?;
        if spec.tag_property_index.is_none() {
            self.line(format!("size += {}; // {field} tag", spec.tag_width));
        }
        self.open(format!("if let Some(value) = &self.{field}"));
        self.open("size += match value");
        for v in &spec.variants {
            self.line(format!(
                "{union}::{}(v) => v.size(),",
                names::type_ident(&v.ty_name)
            ));
        }
        self.close_with(";");
        self.close();
        Ok(())
    }

    fn emit_collection_size(&mut self, m: &SchemaMember, field: &str) -> Result<(), CompilerError> {
        let spec = self.collection_of(m)?;
        if let CountStrategy::Prefixed(ct) = spec.strategy() {
            self.line(format!("size += {}; // {field} count", ct.width()));
        }

        match spec.mode {
            PolyMode::SingleSharedTag => {
                let (union, poly) = self.union_of(m)?;
                if poly.tag_property_index.is_none() {
                    self.line(format!("size += {}; // {field} shared tag", poly.tag_width));
                }
                self.emit_union_elem_size(field, &union, poly)?;
            }
            PolyMode::PerElementTag => {
                let (union, poly) = self.union_of(m)?;
                self.line(format!(
                    "size += self.{field}.len() * {}; // {field} element tags",
                    poly.tag_width
                ));
                self.emit_union_elem_size(field, &union, poly)?;
            }
            PolyMode::None => match classify_elem(m) {
                ElemStrategy::ByteBlock => {
                    self.line(format!("size += self.{field}.len();"));
                }
                ElemStrategy::Scalar(s) => {
                    self.line(format!("size += self.{field}.len() * {};", s.width()));
                }
                ElemStrategy::Enum => {
                    let ResolvedKind::Enum { repr, .. } = &spec.elem.kind else {
                        return Err(self.err(format!(
                            "collection {:?} classified enum elements without an enum",
                            m.name
                        )));
                    };
                    self.line(format!("size += self.{field}.len() * {};", repr.width()));
                }
                ElemStrategy::Text => {
                    self.open(format!("for item in &self.{field}"));
                    self.line("size += 4 + item.len();");
                    self.close();
                }
                ElemStrategy::Nested => {
                    self.open(format!("for item in &self.{field}"));
                    self.line("size += item.size();");
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

    fn emit_union_elem_size(
        &mut self,
        field: &str,
        union: &str,
        spec: &crate::model::PolySpec,
    ) -> Result<(), CompilerError> {
        self.open(format!("for item in &self.{field}"));
        self.open("size += match item");
        for v in &spec.variants {
            self.line(format!(
                "{union}::{}(v) => v.size(),",
                names::type_ident(&v.ty_name)
            ));
        }
        self.close_with(";");
        self.close();
        Ok(())
    }
}

// Shared accessors used by all three operation emitters.
impl Emitter<'_> {
    pub(crate) fn collection_of<'m>(
        &self,
        m: &'m SchemaMember,
    ) -> Result<&'m crate::model::CollectionSpec, CompilerError> {
        m.collection
            .as_ref()
            .ok_or_else(|| self.err(format!("member {:?} has no collection spec", m.name)))
    }

    pub(crate) fn codec_of<'m>(
        &self,
        m: &'m SchemaMember,
    ) -> Result<&'m crate::model::CodecRef, CompilerError> {
        m.codec
            .as_ref()
            .ok_or_else(|| self.err(format!("member {:?} has no custom codec", m.name)))
    }

    /// The union name and polymorphic spec of a polymorphic member, for
    /// both scalar position and collection elements.
    pub(crate) fn union_of<'m>(
        &self,
        m: &'m SchemaMember,
    ) -> Result<(String, &'m crate::model::PolySpec), CompilerError> {
        let spec = m
            .polymorphic
            .as_ref()
            .ok_or_else(|| self.err(format!("member {:?} has no polymorphic spec", m.name)))?;
        let name = match (&m.kind, m.collection.as_ref().map(|c| &c.elem.kind)) {
            (ResolvedKind::Union(n), _) => n.clone(),
            (_, Some(ResolvedKind::Union(n))) => n.clone(),
            _ => {
                return Err(self.err(format!(
                    "member {:?} is polymorphic but names no union",
                    m.name
                )))
            }
        };
        Ok((names::type_ident(&name), spec))
    }

    /// Field type string, shared with struct emission.
    pub(crate) fn member_field_ty(&self, m: &SchemaMember) -> Result<String, CompilerError> {
        field_ty(self, m)
    }
}
