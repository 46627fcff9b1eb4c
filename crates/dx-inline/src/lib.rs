//! DX Class Inliner
//!
//! Eliminates short-lived local objects whose identity never escapes:
//! `new T(...)` roots and static-final singletons backed by trivial
//! class initializers are force-inlined and flattened into the values
//! they carry. Eligibility facts come from the analyses in
//! [`analysis`], recorded on each method's optimization-info.

pub mod analysis;
mod inliner;
mod transform;

pub use inliner::{force_inline, InlineError};
pub use transform::ClassInliner;

#[cfg(test)]
mod tests {
    use super::analysis::{analyze_class_initializer, analyze_receiver_behavior};
    use super::ClassInliner;
    use dx_ir::{
        AccessFlags, ApplicationView, ClassDefinition, FieldDefinition, FieldReference,
        InstructionKind, InvokeKind, IrReference, MethodDefinition, MethodReference,
        MethodSignature, Type,
    };
    use dx_keep::{CompilerOptions, KeepOracle, RuleSet};
    use dx_test_utils::{object_init, static_method, test_view, value_holder_class, BodyBuilder};
    use pretty_assertions::{assert_eq, assert_ne};

    fn run_analyses(view: &ApplicationView) {
        let pool = view.pool();
        for class in view.program_classes() {
            analyze_class_initializer(class, pool);
            for method in &class.methods {
                analyze_receiver_behavior(method, pool);
            }
        }
    }

    fn assert_no_trace_of(code: &dx_ir::IrCode, ty: Type) {
        for reference in code.references() {
            match reference {
                IrReference::Type(t) => assert_ne!(t, ty),
                IrReference::Field(field) => assert_ne!(field.holder, ty),
                IrReference::Method(method) => assert_ne!(method.holder, ty),
            }
        }
        for block in code.blocks() {
            for instruction in &block.instructions {
                assert!(
                    !matches!(instruction.kind, InstructionKind::NewInstance { ty: t } if t == ty)
                );
            }
        }
    }

    /// `class L { final int x; L(int x){this.x=x;} }` used as
    /// `return new L(42).x` flattens to `return 42`
    #[test]
    fn wrapper_allocation_flattens_to_constant() {
        let mut view = test_view();
        let pool = view.pool_arc();
        view.add_program_class(value_holder_class(&pool, "LL;", "x"))
            .unwrap();
        let wrapper = pool.intern_type("LL;");
        let field = FieldReference::new(wrapper, pool.intern_name("x"), pool.int_type());
        let init = MethodReference::new(
            wrapper,
            MethodSignature::new(pool.init_name(), [pool.int_type()], pool.void_type()),
        );

        let holder = pool.intern_type("LC;");
        let mut body = BodyBuilder::new();
        let object = body.new_instance(wrapper);
        let forty_two = body.const_int(42);
        body.invoke(InvokeKind::Direct, init, &[object, forty_two]);
        let read = body.instance_get(field, object);
        let mut main_class =
            ClassDefinition::new(holder, Some(pool.object_type()), AccessFlags::empty());
        main_class.methods.push(static_method(
            &pool,
            holder,
            "m",
            [],
            pool.int_type(),
            body.return_value(read),
        ));
        view.add_program_class(main_class).unwrap();
        run_analyses(&view);

        let options = CompilerOptions::default();
        let oracle = KeepOracle::new(RuleSet::empty(), &options);
        let inliner = ClassInliner::new(&options);

        let method = view
            .program_class(holder)
            .unwrap()
            .methods
            .first()
            .unwrap();
        let rewritten = inliner
            .process_method(method, &view, &oracle)
            .expect("the wrapper is eliminated");

        assert_eq!(rewritten.verify(), Ok(()));
        assert_no_trace_of(&rewritten, wrapper);
        // the method returns the constant that was stored
        let returned = rewritten
            .blocks()
            .iter()
            .flat_map(|b| &b.instructions)
            .find_map(|i| match &i.kind {
                InstructionKind::Return { value } => *value,
                _ => None,
            })
            .expect("a return remains");
        let defined_by = rewritten
            .blocks()
            .iter()
            .flat_map(|b| &b.instructions)
            .find(|i| i.dest == Some(returned))
            .expect("returned value has a definition");
        assert_eq!(defined_by.kind, InstructionKind::ConstInt { value: 42 });
    }

    /// `class F { static final F I = new F(); int g(){return 7;} }`
    /// used as `return F.I.g()` flattens to `return 7`
    #[test]
    fn singleton_call_flattens_to_constant() {
        let mut view = test_view();
        let pool = view.pool_arc();
        let singleton_ty = pool.intern_type("LF;");
        let instance =
            FieldReference::new(singleton_ty, pool.intern_name("I"), singleton_ty);
        let init = MethodReference::new(
            singleton_ty,
            MethodSignature::new(pool.init_name(), [], pool.void_type()),
        );

        let mut singleton = ClassDefinition::new(
            singleton_ty,
            Some(pool.object_type()),
            AccessFlags::empty().with(AccessFlags::FINAL),
        );
        singleton.fields.push(FieldDefinition::new(
            instance,
            AccessFlags::empty()
                .with(AccessFlags::STATIC)
                .with(AccessFlags::FINAL),
        ));
        let mut ctor_body = BodyBuilder::new();
        let receiver = ctor_body.argument(0, singleton_ty);
        ctor_body.invoke(InvokeKind::Direct, object_init(&pool), &[receiver]);
        singleton.methods.push(MethodDefinition::with_code(
            init.clone(),
            AccessFlags::empty().with(AccessFlags::PUBLIC),
            ctor_body.return_void(),
        ));
        let mut getter_body = BodyBuilder::new();
        let seven = getter_body.const_int(7);
        let getter = MethodReference::new(
            singleton_ty,
            MethodSignature::new(pool.intern_name("g"), [], pool.int_type()),
        );
        singleton.methods.push(MethodDefinition::with_code(
            getter.clone(),
            AccessFlags::empty().with(AccessFlags::PUBLIC),
            getter_body.return_value(seven),
        ));
        let mut clinit_body = BodyBuilder::new();
        let allocated = clinit_body.new_instance(singleton_ty);
        clinit_body.invoke(InvokeKind::Direct, init, &[allocated]);
        clinit_body.static_put(instance, allocated);
        singleton.methods.push(MethodDefinition::with_code(
            MethodReference::new(
                singleton_ty,
                MethodSignature::new(pool.clinit_name(), [], pool.void_type()),
            ),
            AccessFlags::empty().with(AccessFlags::STATIC),
            clinit_body.return_void(),
        ));
        view.add_program_class(singleton).unwrap();

        let holder = pool.intern_type("LC;");
        let mut body = BodyBuilder::new();
        let read = body.static_get(instance);
        let result = body.invoke_with_result(InvokeKind::Virtual, getter, &[read]);
        let mut main_class =
            ClassDefinition::new(holder, Some(pool.object_type()), AccessFlags::empty());
        main_class.methods.push(static_method(
            &pool,
            holder,
            "m",
            [],
            pool.int_type(),
            body.return_value(result),
        ));
        view.add_program_class(main_class).unwrap();
        run_analyses(&view);

        let options = CompilerOptions::default();
        let oracle = KeepOracle::new(RuleSet::empty(), &options);
        let inliner = ClassInliner::new(&options);

        let method = view
            .program_class(holder)
            .unwrap()
            .methods
            .first()
            .unwrap();
        let rewritten = inliner
            .process_method(method, &view, &oracle)
            .expect("the singleton read is eliminated");

        assert_eq!(rewritten.verify(), Ok(()));
        assert_no_trace_of(&rewritten, singleton_ty);
        let returned = rewritten
            .blocks()
            .iter()
            .flat_map(|b| &b.instructions)
            .find_map(|i| match &i.kind {
                InstructionKind::Return { value } => *value,
                _ => None,
            })
            .expect("a return remains");
        let defined_by = rewritten
            .blocks()
            .iter()
            .flat_map(|b| &b.instructions)
            .find(|i| i.dest == Some(returned))
            .expect("returned value has a definition");
        assert_eq!(defined_by.kind, InstructionKind::ConstInt { value: 7 });
    }

    /// an over-budget constructor body silently skips the candidate
    #[test]
    fn budget_exceeded_skips_silently() {
        let mut view = test_view();
        let pool = view.pool_arc();
        view.add_program_class(value_holder_class(&pool, "LL;", "x"))
            .unwrap();
        let wrapper = pool.intern_type("LL;");
        let field = FieldReference::new(wrapper, pool.intern_name("x"), pool.int_type());
        let init = MethodReference::new(
            wrapper,
            MethodSignature::new(pool.init_name(), [pool.int_type()], pool.void_type()),
        );

        let holder = pool.intern_type("LC;");
        let mut body = BodyBuilder::new();
        let object = body.new_instance(wrapper);
        let forty_two = body.const_int(42);
        body.invoke(InvokeKind::Direct, init, &[object, forty_two]);
        let read = body.instance_get(field, object);
        let mut main_class =
            ClassDefinition::new(holder, Some(pool.object_type()), AccessFlags::empty());
        main_class.methods.push(static_method(
            &pool,
            holder,
            "m",
            [],
            pool.int_type(),
            body.return_value(read),
        ));
        view.add_program_class(main_class).unwrap();
        run_analyses(&view);

        let options = CompilerOptions {
            class_inlining_budget: 1,
            ..CompilerOptions::default()
        };
        let oracle = KeepOracle::new(RuleSet::empty(), &options);
        let inliner = ClassInliner::new(&options);

        let method = view
            .program_class(holder)
            .unwrap()
            .methods
            .first()
            .unwrap();
        assert!(inliner.process_method(method, &view, &oracle).is_none());
    }
}
