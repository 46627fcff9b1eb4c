//! Per-method IR optimization
//!
//! Runs the eligibility analyses and the class inliner over every
//! program method. Work is dispatched per method region: analyses write
//! only their method's optimization-info (guarded by the per-method
//! monitor), the inliner computes replacement bodies against the frozen
//! view, and replacements are installed after the pool has drained.
//!
//! The pass tail enforces the boundary behaviors: methods whose IR has
//! no blocks left are removed outright, and program classes that are
//! unreferenced and unpinned are swept (pinned roots anchor the
//! reachability walk).

use crate::error::DriverError;
use crate::pass::{OptimizationPass, PassContext};
use crate::passes::tree_shaking::reachable_classes;
use dx_inline::analysis::{
    analyze_class_initializer, analyze_parameter_usage, analyze_receiver_behavior,
};
use dx_inline::ClassInliner;
use dx_ir::{ApplicationView, IrCode, MethodSignature, Type};
use dx_lens::GraphLens;
use std::collections::HashSet;
use tracing::info;

/// Pass 6: analyses plus the class inliner; emits no lens
#[derive(Debug, Default)]
pub struct IrOptimizationPass;

impl OptimizationPass for IrOptimizationPass {
    fn name(&self) -> &'static str {
        "ir-optimization"
    }

    fn run(
        &self,
        view: &mut ApplicationView,
        cx: &mut PassContext<'_>,
    ) -> Result<Option<GraphLens>, DriverError> {
        let pool = view.pool_arc();
        let class_types: Vec<Type> = view.sorted_program_types();

        // analyses; receiver facts land before parameter usage reads
        // them through callee resolution
        {
            let frozen: &ApplicationView = view;
            cx.scheduler.process(&class_types, |ty| {
                if let Some(class) = frozen.program_class(*ty) {
                    analyze_class_initializer(class, &pool);
                    for method in &class.methods {
                        analyze_receiver_behavior(method, &pool);
                    }
                }
            });
            cx.scheduler.process(&class_types, |ty| {
                if let Some(class) = frozen.program_class(*ty) {
                    for method in &class.methods {
                        analyze_parameter_usage(method, frozen);
                    }
                }
            });
        }

        // class inlining: compute against the frozen view, install after
        if cx.options.enable_class_inlining {
            let inliner = ClassInliner::new(cx.options);
            let replacements: Vec<(Type, Vec<(MethodSignature, IrCode)>)> = {
                let frozen: &ApplicationView = view;
                cx.scheduler.map(&class_types, |ty| {
                    let mut replaced = Vec::new();
                    if let Some(class) = frozen.program_class(*ty) {
                        for method in &class.methods {
                            if let Some(code) =
                                inliner.process_method(method, frozen, cx.oracle)
                            {
                                replaced.push((method.reference.signature.clone(), code));
                            }
                        }
                    }
                    (*ty, replaced)
                })
            };
            let mut inlined = 0usize;
            for (ty, replaced) in replacements {
                let Some(class) = view.program_class_mut(ty) else { continue };
                for (signature, code) in replaced {
                    if let Some(method) = class.method_mut(&signature) {
                        method.code = Some(code);
                        inlined += 1;
                    }
                }
            }
            info!(methods = inlined, "class inlining rewrote methods");
        }

        // boundary behaviors: zero-block methods and member-free
        // unpinned classes are removed outright
        for class in view.program_classes_mut() {
            class
                .methods
                .retain(|m| m.code.as_ref().map_or(true, |code| !code.is_empty()));
        }
        let member_free: Vec<Type> = view
            .sorted_program_types()
            .into_iter()
            .filter(|ty| {
                view.program_class(*ty).map_or(false, |class| {
                    class.is_member_free() && !cx.oracle.is_pinned_class(&pool, *ty)
                })
            })
            .collect();
        for ty in member_free {
            view.remove_program_class(ty);
        }

        // sweep classes that became unreferenced, anchored on pins
        let roots: HashSet<Type> = view
            .sorted_program_types()
            .into_iter()
            .filter(|ty| {
                let Some(class) = view.program_class(*ty) else {
                    return false;
                };
                cx.oracle.is_pinned_class(&pool, *ty)
                    || class.methods.iter().any(|m| {
                        cx.oracle.method_constraints(&pool, &m.reference).pinned
                    })
            })
            .collect();
        if !roots.is_empty() {
            let live = reachable_classes(view, &roots);
            let dead: Vec<Type> = view
                .sorted_program_types()
                .into_iter()
                .filter(|ty| !live.contains(ty))
                .collect();
            for ty in &dead {
                view.remove_program_class(*ty);
            }
            info!(swept = dead.len(), "dead-class sweep complete");
        }
        Ok(None)
    }
}
