//! Minification
//!
//! Deterministic shortest-name renaming over classes, then members per
//! class, in descriptor order. Pinned symbols, initializers, library
//! overrides, and virtual methods visible to subtypes keep their names.
//! Emits the final renaming lens; the residual mapping falls out of the
//! flattened stack.

use crate::error::DriverError;
use crate::pass::{OptimizationPass, PassContext};
use dx_ir::{
    ApplicationView, ClassHierarchy, FieldReference, MethodReference, MethodSignature,
    SymbolPool, Type,
};
use dx_lens::GraphLens;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Pass 7: shorten names
#[derive(Debug, Default)]
pub struct MinificationPass;

/// Yields `a`..`z`, `aa`, `ab`, ... deterministically
#[derive(Debug, Default)]
struct NameGenerator {
    next: usize,
}

impl NameGenerator {
    fn next_name(&mut self) -> String {
        let mut index = self.next;
        self.next += 1;
        let mut out = String::new();
        loop {
            out.insert(0, (b'a' + (index % 26) as u8) as char);
            index /= 26;
            if index == 0 {
                break;
            }
            index -= 1;
        }
        out
    }
}

impl OptimizationPass for MinificationPass {
    fn name(&self) -> &'static str {
        "minification"
    }

    fn run(
        &self,
        view: &mut ApplicationView,
        cx: &mut PassContext<'_>,
    ) -> Result<Option<GraphLens>, DriverError> {
        if !cx.options.minification {
            return Ok(None);
        }
        let pool = view.pool_arc();
        let hierarchy = ClassHierarchy::build(view);
        let mut builder = GraphLens::builder();

        // class names first; member references below need the renamed
        // holders
        let mut taken_descriptors: HashSet<String> = view
            .program_classes()
            .chain(view.library_classes())
            .map(|c| pool.type_descriptor(c.ty).to_string())
            .collect();
        let mut class_generator = NameGenerator::default();
        let mut type_renames: HashMap<Type, Type> = HashMap::new();
        for ty in view.sorted_program_types() {
            if !cx
                .oracle
                .class_constraints(&pool, ty)
                .allows_renaming()
            {
                continue;
            }
            let descriptor = loop {
                let candidate = format!("L{};", class_generator.next_name());
                if !taken_descriptors.contains(&candidate) {
                    break candidate;
                }
            };
            taken_descriptors.insert(descriptor.clone());
            let renamed = pool.intern_type(&descriptor);
            type_renames.insert(ty, renamed);
            builder.rename_type(ty, renamed);
        }
        let map_type = |ty: Type| type_renames.get(&ty).copied().unwrap_or(ty);

        let mut renamed_members = 0usize;
        for ty in view.sorted_program_types() {
            let Some(class) = view.program_class(ty) else { continue };
            let new_holder = map_type(ty);
            let mut generator = NameGenerator::default();
            // names that stay put must not be reassigned
            let mut used: HashSet<String> = HashSet::new();
            for field in &class.fields {
                if !cx
                    .oracle
                    .field_constraints(&pool, field.reference)
                    .allows_renaming()
                {
                    used.insert(pool.name_text(field.reference.name).to_string());
                }
            }
            for method in &class.methods {
                let keep = !renameable_method(view, &hierarchy, &pool, cx, class, method);
                if keep {
                    used.insert(pool.name_text(method.reference.signature.name).to_string());
                }
            }

            for field in &class.fields {
                if !cx
                    .oracle
                    .field_constraints(&pool, field.reference)
                    .allows_renaming()
                {
                    continue;
                }
                let fresh = next_free(&mut generator, &used);
                used.insert(fresh.clone());
                let renamed = FieldReference::new(
                    new_holder,
                    pool.intern_name(&fresh),
                    map_type(field.reference.ty),
                );
                builder.rename_field(field.reference, renamed);
                renamed_members += 1;
            }
            for method in &class.methods {
                if !renameable_method(view, &hierarchy, &pool, cx, class, method) {
                    continue;
                }
                let fresh = next_free(&mut generator, &used);
                used.insert(fresh.clone());
                let signature = MethodSignature::new(
                    pool.intern_name(&fresh),
                    method
                        .reference
                        .signature
                        .parameters
                        .iter()
                        .map(|p| map_type(*p)),
                    map_type(method.reference.signature.return_type),
                );
                builder.rename_method(
                    method.reference.clone(),
                    MethodReference::new(new_holder, signature),
                );
                renamed_members += 1;
            }
        }

        if builder.is_empty() {
            return Ok(None);
        }
        info!(
            renamed_classes = type_renames.len(),
            renamed_members, "minification complete"
        );
        Ok(Some(builder.build(&pool)?))
    }
}

fn next_free(generator: &mut NameGenerator, used: &HashSet<String>) -> String {
    loop {
        let candidate = generator.next_name();
        if !used.contains(&candidate) {
            return candidate;
        }
    }
}

/// A method keeps its name when pinned, an initializer, or visible to
/// dispatch the renamer cannot see through (overrides, subtypes)
fn renameable_method(
    view: &ApplicationView,
    hierarchy: &ClassHierarchy,
    pool: &SymbolPool,
    cx: &PassContext<'_>,
    class: &dx_ir::ClassDefinition,
    method: &dx_ir::MethodDefinition,
) -> bool {
    if method.is_instance_initializer(pool) || method.is_class_initializer(pool) {
        return false;
    }
    if !cx
        .oracle
        .method_constraints(pool, &method.reference)
        .allows_renaming()
    {
        return false;
    }
    if !method.is_virtual(pool) {
        return true;
    }
    // virtual: only when nothing above declares it and nothing below
    // can see it. "Above" spans the superclass chain and every
    // transitively implemented interface; an interface-declared
    // signature pins the name on all implementors, since interface
    // call sites reference the interface's own declaration
    let mut above: Vec<Type> = Vec::new();
    let mut ancestor = class.superclass;
    while let Some(current) = ancestor {
        above.push(current);
        ancestor = view.definition(current).and_then(|d| d.superclass);
    }
    above.extend(view.transitive_interfaces(class.ty));
    for current in above {
        let declared = view
            .definition(current)
            .map_or(false, |d| d.method(&method.reference.signature).is_some());
        if declared {
            return false;
        }
    }
    hierarchy
        .direct_subtypes(class.ty)
        .iter()
        .all(|sub| !view.is_program(*sub))
}
