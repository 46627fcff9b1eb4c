//! Initial tree shaking
//!
//! Marks live symbols starting from the pinned roots and sweeps
//! everything else. With no pinned roots at all there are no entry
//! points to shake from and the pass keeps the program untouched, which
//! also gives the zero-rule idempotence law its footing.
//!
//! Unresolved references surface here: live bytecode referencing a
//! symbol that is neither program nor library is reported as an error
//! unless the holder is covered by a dont-warn rule (fully silent) or
//! missing-class tolerance downgrades it to a warning. The reference is
//! left dangling either way.

use crate::diagnostics::{Diagnostic, DiagnosticLocation};
use crate::error::DriverError;
use crate::pass::{OptimizationPass, PassContext};
use dx_ir::{
    ApplicationView, IrReference, MethodReference, SymbolPool, Type,
};
use dx_lens::GraphLens;
use std::collections::HashSet;
use tracing::info;

/// Pass 1: mark and sweep
#[derive(Debug, Default)]
pub struct TreeShakingPass;

impl OptimizationPass for TreeShakingPass {
    fn name(&self) -> &'static str {
        "tree-shaking"
    }

    fn run(
        &self,
        view: &mut ApplicationView,
        cx: &mut PassContext<'_>,
    ) -> Result<Option<GraphLens>, DriverError> {
        let pool = view.pool_arc();

        let mut live_classes: HashSet<Type> = HashSet::new();
        let mut live_methods: HashSet<MethodReference> = HashSet::new();
        let mut worklist: Vec<MethodReference> = Vec::new();

        for ty in view.sorted_program_types() {
            let Some(class) = view.program_class(ty) else { continue };
            let class_pinned = cx.oracle.is_pinned_class(&pool, ty);
            if class_pinned {
                live_classes.insert(ty);
            }
            for method in &class.methods {
                if class_pinned
                    || cx
                        .oracle
                        .method_constraints(&pool, &method.reference)
                        .pinned
                {
                    live_classes.insert(ty);
                    if live_methods.insert(method.reference.clone()) {
                        worklist.push(method.reference.clone());
                    }
                }
            }
        }

        if live_classes.is_empty() {
            // no entry points declared; nothing to shake from
            return Ok(None);
        }

        let mut missing_reported: HashSet<Type> = HashSet::new();
        while let Some(reference) = worklist.pop() {
            let Some(method) = view.resolve_method(&reference) else {
                report_unresolved(view, cx, &pool, reference.holder, &mut missing_reported);
                continue;
            };
            for ty in signature_types(&reference) {
                mark_class(view, ty, &mut live_classes);
            }
            let Some(code) = &method.code else { continue };
            for body_reference in code.references() {
                match body_reference {
                    IrReference::Type(ty) => mark_class(view, ty, &mut live_classes),
                    IrReference::Field(field) => {
                        mark_class(view, field.holder, &mut live_classes);
                        mark_class(view, field.ty, &mut live_classes);
                        if view.definition(field.holder).is_none() {
                            report_unresolved(
                                view,
                                cx,
                                &pool,
                                field.holder,
                                &mut missing_reported,
                            );
                        }
                    }
                    IrReference::Method(callee) => {
                        mark_class(view, callee.holder, &mut live_classes);
                        if view.resolve_method(&callee).is_none() {
                            report_unresolved(
                                view,
                                cx,
                                &pool,
                                callee.holder,
                                &mut missing_reported,
                            );
                        } else if live_methods.insert(callee.clone()) {
                            worklist.push(callee);
                        }
                    }
                }
            }
        }

        // superclasses, interfaces, and class initializers of live
        // classes are live; iterate to a fixed point
        loop {
            let before = (live_classes.len(), live_methods.len());
            let snapshot: Vec<Type> = live_classes.iter().copied().collect();
            for ty in snapshot {
                let Some(class) = view.definition(ty) else { continue };
                if let Some(superclass) = class.superclass {
                    mark_class(view, superclass, &mut live_classes);
                }
                for interface in class.interfaces.clone() {
                    mark_class(view, interface, &mut live_classes);
                }
                if let Some(clinit) = class.class_initializer(&pool) {
                    if live_methods.insert(clinit.reference.clone()) {
                        worklist.push(clinit.reference.clone());
                    }
                }
                // virtual overrides of live supertype methods stay
                // live; supertypes are the superclass chain plus every
                // transitively implemented interface, since interface
                // dispatch resolves to the interface's own declaration
                let mut supertypes: Vec<Type> = Vec::new();
                let mut ancestor = class.superclass;
                while let Some(current) = ancestor {
                    supertypes.push(current);
                    ancestor = view.definition(current).and_then(|c| c.superclass);
                }
                supertypes.extend(view.transitive_interfaces(class.ty));
                for method in class.virtual_methods(&pool) {
                    if live_methods.contains(&method.reference) {
                        continue;
                    }
                    for current in &supertypes {
                        let inherited = method.reference.with_holder(*current);
                        if live_methods.contains(&inherited)
                            || view
                                .definition(*current)
                                .and_then(|c| c.method(&method.reference.signature))
                                .map_or(false, |m| live_methods.contains(&m.reference))
                        {
                            live_methods.insert(method.reference.clone());
                            worklist.push(method.reference.clone());
                            break;
                        }
                    }
                }
            }
            // drain anything the fixed point enqueued
            while let Some(reference) = worklist.pop() {
                let Some(method) = view.resolve_method(&reference) else { continue };
                let Some(code) = &method.code else { continue };
                for body_reference in code.references() {
                    match body_reference {
                        IrReference::Type(ty) => mark_class(view, ty, &mut live_classes),
                        IrReference::Field(field) => {
                            mark_class(view, field.holder, &mut live_classes);
                        }
                        IrReference::Method(callee) => {
                            mark_class(view, callee.holder, &mut live_classes);
                            if view.resolve_method(&callee).is_some()
                                && live_methods.insert(callee.clone())
                            {
                                worklist.push(callee);
                            }
                        }
                    }
                }
            }
            if before == (live_classes.len(), live_methods.len()) {
                break;
            }
        }

        // sweep
        let swept: Vec<Type> = view
            .sorted_program_types()
            .into_iter()
            .filter(|ty| !live_classes.contains(ty))
            .collect();
        for ty in &swept {
            view.remove_program_class(*ty);
        }
        let mut swept_members = 0usize;
        for class in view.program_classes_mut() {
            let before = class.methods.len();
            let class_pinned = live_classes.contains(&class.ty)
                && cx.oracle.is_pinned_class(&pool, class.ty);
            class
                .methods
                .retain(|m| class_pinned || live_methods.contains(&m.reference));
            swept_members += before - class.methods.len();
        }
        info!(
            swept_classes = swept.len(),
            swept_members, "tree shaking complete"
        );
        Ok(None)
    }
}

fn mark_class(view: &ApplicationView, ty: Type, live: &mut HashSet<Type>) {
    if view.is_program(ty) {
        live.insert(ty);
    }
}

fn signature_types(reference: &MethodReference) -> Vec<Type> {
    let mut types: Vec<Type> = reference.signature.parameters.to_vec();
    types.push(reference.signature.return_type);
    types.push(reference.holder);
    types
}

fn report_unresolved(
    view: &ApplicationView,
    cx: &PassContext<'_>,
    pool: &SymbolPool,
    holder: Type,
    reported: &mut HashSet<Type>,
) {
    if view.definition(holder).is_some() || !reported.insert(holder) {
        return;
    }
    // a dont-warn rule silences the reference entirely
    if cx.oracle.dont_warn(pool, holder) {
        return;
    }
    let message = format!(
        "unresolved reference to {}",
        pool.type_descriptor(holder)
    );
    let location = DiagnosticLocation::Class(pool.type_descriptor(holder).to_string());
    if cx.options.ignore_missing_classes {
        cx.diagnostics.report(Diagnostic::warning(message, location));
    } else {
        cx.diagnostics.report(Diagnostic::error(message, location));
    }
}

/// Class-granular reachability from a root set; shared with the
/// dead-class sweep after per-method optimization
#[must_use]
pub(crate) fn reachable_classes(
    view: &ApplicationView,
    roots: &HashSet<Type>,
) -> HashSet<Type> {
    let mut live: HashSet<Type> = roots
        .iter()
        .copied()
        .filter(|ty| view.is_program(*ty))
        .collect();
    let mut worklist: Vec<Type> = live.iter().copied().collect();
    while let Some(ty) = worklist.pop() {
        let Some(class) = view.program_class(ty) else { continue };
        let mut touch = |target: Type, live: &mut HashSet<Type>, worklist: &mut Vec<Type>| {
            if view.is_program(target) && live.insert(target) {
                worklist.push(target);
            }
        };
        if let Some(superclass) = class.superclass {
            touch(superclass, &mut live, &mut worklist);
        }
        for interface in &class.interfaces {
            touch(*interface, &mut live, &mut worklist);
        }
        for field in &class.fields {
            touch(field.reference.ty, &mut live, &mut worklist);
        }
        for method in &class.methods {
            for ty in signature_types(&method.reference) {
                touch(ty, &mut live, &mut worklist);
            }
            let Some(code) = &method.code else { continue };
            for reference in code.references() {
                match reference {
                    IrReference::Type(target) => touch(target, &mut live, &mut worklist),
                    IrReference::Field(field) => {
                        touch(field.holder, &mut live, &mut worklist);
                        touch(field.ty, &mut live, &mut worklist);
                    }
                    IrReference::Method(method_reference) => {
                        touch(method_reference.holder, &mut live, &mut worklist);
                    }
                }
            }
        }
    }
    live
}
