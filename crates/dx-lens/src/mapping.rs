//! Residual rename map
//!
//! The composition of every lens still in effect, rendered in the
//! line-oriented proguard-style mapping format:
//!
//! ```text
//! com.example.Foo -> a:
//!     int x -> b
//!     void m(int) -> c
//! ```
//!
//! The inverse direction supports retracing: mapping post-optimization
//! class/method names in a stack frame back to their originals.

use crate::lens::GraphLens;
use dx_ir::SymbolPool;
use indexmap::IndexMap;
use std::fmt::Write as _;

/// One renamed member line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberMapping {
    /// Rendered original member (e.g. `int x` or `void m(int)`)
    pub original: String,
    /// Original simple name
    pub original_name: String,
    /// Obfuscated simple name
    pub obfuscated_name: String,
}

/// All renames within one class
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassMapping {
    /// Original java-style class name
    pub original: String,
    /// Obfuscated java-style class name
    pub obfuscated: String,
    /// Field lines
    pub fields: Vec<MemberMapping>,
    /// Method lines
    pub methods: Vec<MemberMapping>,
}

/// Rename map over the whole program
#[derive(Debug, Clone, Default)]
pub struct RenameMapping {
    classes: IndexMap<String, ClassMapping>,
}

/// Convert a class descriptor (`Lcom/example/Foo;`) to a java name
/// (`com.example.Foo`); primitives and arrays render as source text
#[must_use]
pub fn descriptor_to_java(descriptor: &str) -> String {
    match descriptor.as_bytes().first() {
        Some(b'L') => descriptor[1..descriptor.len() - 1].replace('/', "."),
        Some(b'[') => format!("{}[]", descriptor_to_java(&descriptor[1..])),
        _ => match descriptor {
            "Z" => "boolean".to_string(),
            "B" => "byte".to_string(),
            "S" => "short".to_string(),
            "C" => "char".to_string(),
            "I" => "int".to_string(),
            "J" => "long".to_string(),
            "F" => "float".to_string(),
            "D" => "double".to_string(),
            "V" => "void".to_string(),
            other => other.to_string(),
        },
    }
}

impl RenameMapping {
    /// Build the mapping from a flattened lens
    ///
    /// The lens must already map original symbols to their final forms;
    /// flattening a stack produces exactly that.
    #[must_use]
    pub fn from_lens(lens: &GraphLens, pool: &SymbolPool) -> Self {
        let mut mapping = Self::default();

        for (from, to) in lens.renamed_types() {
            let original = descriptor_to_java(&pool.type_descriptor(from));
            let obfuscated = descriptor_to_java(&pool.type_descriptor(to));
            mapping
                .classes
                .entry(original.clone())
                .or_insert_with(|| ClassMapping {
                    original: original.clone(),
                    obfuscated: obfuscated.clone(),
                    ..ClassMapping::default()
                })
                .obfuscated = obfuscated.clone();
        }

        for (from, to) in lens.renamed_fields() {
            let holder = descriptor_to_java(&pool.type_descriptor(from.holder));
            let original_name = pool.name_text(from.name).to_string();
            let obfuscated_name = pool.name_text(to.name).to_string();
            let entry = mapping.class_entry(&holder, pool, lens, from.holder);
            entry.fields.push(MemberMapping {
                original: format!(
                    "{} {}",
                    descriptor_to_java(&pool.type_descriptor(from.ty)),
                    original_name
                ),
                original_name,
                obfuscated_name,
            });
        }

        for (from, to) in lens.renamed_methods() {
            let holder = descriptor_to_java(&pool.type_descriptor(from.holder));
            let original_name = pool.name_text(from.signature.name).to_string();
            let obfuscated_name = pool.name_text(to.signature.name).to_string();
            let parameters = from
                .signature
                .parameters
                .iter()
                .map(|p| descriptor_to_java(&pool.type_descriptor(*p)))
                .collect::<Vec<_>>()
                .join(",");
            let entry = mapping.class_entry(&holder, pool, lens, from.holder);
            entry.methods.push(MemberMapping {
                original: format!(
                    "{} {}({})",
                    descriptor_to_java(&pool.type_descriptor(from.signature.return_type)),
                    original_name,
                    parameters
                ),
                original_name,
                obfuscated_name,
            });
        }

        mapping
    }

    fn class_entry(
        &mut self,
        original: &str,
        pool: &SymbolPool,
        lens: &GraphLens,
        holder: dx_ir::Type,
    ) -> &mut ClassMapping {
        let obfuscated = descriptor_to_java(&pool.type_descriptor(lens.map_type(holder)));
        self.classes
            .entry(original.to_string())
            .or_insert_with(|| ClassMapping {
                original: original.to_string(),
                obfuscated,
                ..ClassMapping::default()
            })
    }

    /// Whether no rename is recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class mappings in emission order
    pub fn classes(&self) -> impl Iterator<Item = &ClassMapping> {
        self.classes.values()
    }

    /// Render the mapping text
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for class in self.classes.values() {
            let _ = writeln!(out, "{} -> {}:", class.original, class.obfuscated);
            for field in &class.fields {
                let _ = writeln!(out, "    {} -> {}", field.original, field.obfuscated_name);
            }
            for method in &class.methods {
                let _ = writeln!(out, "    {} -> {}", method.original, method.obfuscated_name);
            }
        }
        out
    }

    /// Original java name of an obfuscated class
    #[must_use]
    pub fn retrace_class<'a>(&'a self, obfuscated: &str) -> Option<&'a str> {
        self.classes
            .values()
            .find(|class| class.obfuscated == obfuscated)
            .map(|class| class.original.as_str())
    }

    /// Original (class, method) of an obfuscated stack frame
    ///
    /// Frames synthesized by inlining carry the caller's obfuscated
    /// class; those map to the caller frame, which is exactly what this
    /// lookup returns.
    #[must_use]
    pub fn retrace_frame<'a>(
        &'a self,
        obfuscated_class: &str,
        obfuscated_method: &'a str,
    ) -> Option<(&'a str, &'a str)> {
        let class = self
            .classes
            .values()
            .find(|class| class.obfuscated == obfuscated_class)?;
        let method = class
            .methods
            .iter()
            .find(|method| method.obfuscated_name == obfuscated_method)
            .map_or(obfuscated_method, |method| method.original_name.as_str());
        Some((class.original.as_str(), method))
    }
}
