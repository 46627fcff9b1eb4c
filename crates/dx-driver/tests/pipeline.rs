//! End-to-end pipeline scenarios
//!
//! Each test assembles a small program, runs the full driver, and
//! checks the observable shape of the output.

use dx_driver::{Driver, DriverError};
use dx_ir::{
    AccessFlags, ApplicationView, ClassDefinition, FieldDefinition, FieldReference,
    InstructionKind, InvokeKind, IrReference, MethodDefinition, MethodReference, MethodSignature,
    Type,
};
use dx_keep::{CompilerOptions, KeepKind, KeepRule, MemberPattern};
use dx_lens::ExtraParameter;
use dx_test_utils::{object_init, static_method, test_view, value_holder_class, BodyBuilder};
use pretty_assertions::assert_eq;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn pin_method(class: &str, member: &str) -> KeepRule {
    KeepRule::member_rule(KeepKind::Pin, class, MemberPattern::named(member))
}

fn no_minify() -> CompilerOptions {
    CompilerOptions {
        minification: false,
        ..CompilerOptions::default()
    }
}

fn returned_constant(view: &ApplicationView, holder: Type, name: &str) -> Option<i64> {
    let pool = view.pool();
    let class = view.program_class(holder)?;
    let method = class
        .methods
        .iter()
        .find(|m| pool.name_text(m.reference.signature.name).as_ref() == name)?;
    let code = method.code.as_ref()?;
    let returned = code
        .blocks()
        .iter()
        .flat_map(|b| &b.instructions)
        .find_map(|i| match &i.kind {
            InstructionKind::Return { value } => *value,
            _ => None,
        })?;
    code.blocks()
        .iter()
        .flat_map(|b| &b.instructions)
        .find(|i| i.dest == Some(returned))
        .and_then(|i| match &i.kind {
            InstructionKind::ConstInt { value } => Some(*value),
            _ => None,
        })
}

/// Scenario A: a wrapper allocation flattens away and the wrapper
/// class disappears
#[test]
fn wrapper_class_is_inlined_and_removed() {
    init_tracing();
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
    let mut class = ClassDefinition::new(holder, Some(pool.object_type()), AccessFlags::empty());
    class.methods.push(static_method(
        &pool,
        holder,
        "m",
        [],
        pool.int_type(),
        body.return_value(read),
    ));
    view.add_program_class(class).unwrap();

    let driver = Driver::new(vec![pin_method("LC;", "m")], no_minify()).unwrap();
    let result = driver.compile(view).unwrap();

    assert!(result.view.program_class(wrapper).is_none());
    assert_eq!(returned_constant(&result.view, holder, "m"), Some(42));
}

/// Scenario B: a static-final singleton flattens away
#[test]
fn singleton_class_is_inlined_and_removed() {
    let mut view = test_view();
    let pool = view.pool_arc();
    let singleton_ty = pool.intern_type("LF;");
    let instance = FieldReference::new(singleton_ty, pool.intern_name("I"), singleton_ty);
    let init = MethodReference::new(
        singleton_ty,
        MethodSignature::new(pool.init_name(), [], pool.void_type()),
    );
    let getter = MethodReference::new(
        singleton_ty,
        MethodSignature::new(pool.intern_name("g"), [], pool.int_type()),
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
    let mut ctor = BodyBuilder::new();
    let receiver = ctor.argument(0, singleton_ty);
    ctor.invoke(InvokeKind::Direct, object_init(&pool), &[receiver]);
    singleton.methods.push(MethodDefinition::with_code(
        init.clone(),
        AccessFlags::empty().with(AccessFlags::PUBLIC),
        ctor.return_void(),
    ));
    let mut g_body = BodyBuilder::new();
    let seven = g_body.const_int(7);
    singleton.methods.push(MethodDefinition::with_code(
        getter.clone(),
        AccessFlags::empty().with(AccessFlags::PUBLIC),
        g_body.return_value(seven),
    ));
    let mut clinit = BodyBuilder::new();
    let allocated = clinit.new_instance(singleton_ty);
    clinit.invoke(InvokeKind::Direct, init, &[allocated]);
    clinit.static_put(instance, allocated);
    singleton.methods.push(MethodDefinition::with_code(
        MethodReference::new(
            singleton_ty,
            MethodSignature::new(pool.clinit_name(), [], pool.void_type()),
        ),
        AccessFlags::empty().with(AccessFlags::STATIC),
        clinit.return_void(),
    ));
    view.add_program_class(singleton).unwrap();

    let holder = pool.intern_type("LC;");
    let mut body = BodyBuilder::new();
    let read = body.static_get(instance);
    let result_value = body.invoke_with_result(InvokeKind::Virtual, getter, &[read]);
    let mut class = ClassDefinition::new(holder, Some(pool.object_type()), AccessFlags::empty());
    class.methods.push(static_method(
        &pool,
        holder,
        "m",
        [],
        pool.int_type(),
        body.return_value(result_value),
    ));
    view.add_program_class(class).unwrap();

    let driver = Driver::new(vec![pin_method("LC;", "m")], no_minify()).unwrap();
    let result = driver.compile(view).unwrap();

    assert!(result.view.program_class(singleton_ty).is_none());
    assert_eq!(returned_constant(&result.view, holder, "m"), Some(7));
}

fn two_holders_and_main(view: &mut ApplicationView) -> (Type, Type, Type) {
    let pool = view.pool_arc();
    view.add_program_class(value_holder_class(&pool, "LA;", "x"))
        .unwrap();
    view.add_program_class(value_holder_class(&pool, "LB;", "y"))
        .unwrap();
    let a = pool.intern_type("LA;");
    let b = pool.intern_type("LB;");
    let a_init = MethodReference::new(
        a,
        MethodSignature::new(pool.init_name(), [pool.int_type()], pool.void_type()),
    );
    let b_init = MethodReference::new(
        b,
        MethodSignature::new(pool.init_name(), [pool.int_type()], pool.void_type()),
    );

    let main_ty = pool.intern_type("LMain;");
    let mut body = BodyBuilder::new();
    let first = body.new_instance(a);
    let one = body.const_int(1);
    body.invoke(InvokeKind::Direct, a_init, &[first, one]);
    let second = body.new_instance(b);
    let two = body.const_int(2);
    body.invoke(InvokeKind::Direct, b_init, &[second, two]);
    let mut main_class =
        ClassDefinition::new(main_ty, Some(pool.object_type()), AccessFlags::empty());
    main_class.methods.push(static_method(
        &pool,
        main_ty,
        "main",
        [],
        pool.void_type(),
        body.return_void(),
    ));
    view.add_program_class(main_class).unwrap();
    (a, b, main_ty)
}

/// Scenario C: two value holders merge into one class-id-dispatched
/// target and the caller is rewritten
#[test]
fn value_holders_merge_horizontally() {
    let mut view = test_view();
    let pool = view.pool_arc();
    let (a, b, main_ty) = two_holders_and_main(&mut view);

    // class inlining off so the merged shape stays observable
    let options = CompilerOptions {
        minification: false,
        enable_class_inlining: false,
        ..CompilerOptions::default()
    };
    let driver = Driver::new(vec![pin_method("LMain;", "main")], options).unwrap();
    let result = driver.compile(view).unwrap();

    // target carries both fields plus the class-id slot
    assert!(result.view.program_class(b).is_none());
    let target = result.view.program_class(a).expect("target survives");
    let names: Vec<String> = target
        .fields
        .iter()
        .map(|f| pool.name_text(f.reference.name).to_string())
        .collect();
    assert!(names.contains(&"x".to_string()));
    assert!(names.contains(&"y".to_string()));
    assert!(names.contains(&"classId".to_string()));

    // the lens stack sends both constructors to one dispatcher with
    // class-ids 0 and 1
    let a_init = MethodReference::new(
        a,
        MethodSignature::new(pool.init_name(), [pool.int_type()], pool.void_type()),
    );
    let b_init = MethodReference::new(
        b,
        MethodSignature::new(pool.init_name(), [pool.int_type()], pool.void_type()),
    );
    let a_lookup = result.lens_stack.map_method(&a_init);
    let b_lookup = result.lens_stack.map_method(&b_init);
    assert_eq!(a_lookup.reference, b_lookup.reference);
    assert_eq!(
        a_lookup.prototype_changes.extra_parameters(),
        &[ExtraParameter::ConstantInt(0)]
    );
    assert_eq!(
        b_lookup.prototype_changes.extra_parameters(),
        &[ExtraParameter::ConstantInt(1)]
    );

    // main's bytecode no longer mentions the source class
    let main_class = result.view.program_class(main_ty).unwrap();
    let main_code = main_class.methods[0].code.as_ref().unwrap();
    assert_eq!(main_code.verify(), Ok(()));
    for reference in main_code.references() {
        match reference {
            IrReference::Type(ty) => assert_ne!(ty, b),
            IrReference::Method(method) => assert_ne!(method.holder, b),
            IrReference::Field(field) => assert_ne!(field.holder, b),
        }
    }
    // both allocations now target the merged class
    let allocations = main_code
        .blocks()
        .iter()
        .flat_map(|bl| &bl.instructions)
        .filter(|i| matches!(i.kind, InstructionKind::NewInstance { ty } if ty == a))
        .count();
    assert_eq!(allocations, 2);
}

/// Scenario E: pinning one member blocks the merge entirely
#[test]
fn pinned_class_blocks_merging() {
    let mut view = test_view();
    let (a, b, _) = two_holders_and_main(&mut view);

    let options = CompilerOptions {
        minification: false,
        enable_class_inlining: false,
        ..CompilerOptions::default()
    };
    let driver = Driver::new(
        vec![
            pin_method("LMain;", "main"),
            KeepRule::class_rule(KeepKind::Pin, "LA;"),
        ],
        options,
    )
    .unwrap();
    let result = driver.compile(view).unwrap();

    assert!(result.view.program_class(a).is_some());
    assert!(result.view.program_class(b).is_some());
    assert!(result.lens_stack.is_empty());
}

fn missing_reference_view() -> (ApplicationView, Type) {
    let mut view = test_view();
    let pool = view.pool_arc();
    let missing = pool.intern_type("LMissing;");
    let missing_method = MethodReference::new(
        missing,
        MethodSignature::new(pool.intern_name("m"), [], pool.void_type()),
    );
    let holder = pool.intern_type("LC;");
    let mut body = BodyBuilder::new();
    body.invoke(InvokeKind::Static, missing_method, &[]);
    let mut class = ClassDefinition::new(holder, Some(pool.object_type()), AccessFlags::empty());
    class.methods.push(static_method(
        &pool,
        holder,
        "m",
        [],
        pool.void_type(),
        body.return_void(),
    ));
    view.add_program_class(class).unwrap();
    (view, missing)
}

/// Scenario F: a dont-warn rule silences the unresolved reference and
/// the dangling reference survives
#[test]
fn dont_warn_suppresses_unresolved_reference() {
    let (view, missing) = missing_reference_view();
    let driver = Driver::new(
        vec![
            pin_method("LC;", "m"),
            KeepRule::class_rule(KeepKind::DontWarn, "LMissing;"),
        ],
        no_minify(),
    )
    .unwrap();
    let result = driver.compile(view).unwrap();

    assert!(result.diagnostics.is_empty());
    let pool = result.view.pool_arc();
    let holder = pool.intern_type("LC;");
    let code = result.view.program_class(holder).unwrap().methods[0]
        .code
        .as_ref()
        .unwrap();
    let still_dangling = code.references().iter().any(|r| {
        matches!(r, IrReference::Method(m) if m.holder == missing)
    });
    assert!(still_dangling);
}

/// Without dont-warn the unresolved reference is fatal
#[test]
fn unresolved_reference_is_fatal_by_default() {
    let (view, _) = missing_reference_view();
    let driver = Driver::new(vec![pin_method("LC;", "m")], no_minify()).unwrap();

    assert!(matches!(
        driver.compile(view),
        Err(DriverError::FatalDiagnostics(_))
    ));
}

/// With missing-class tolerance the reference downgrades to a warning
#[test]
fn unresolved_reference_downgrades_to_warning() {
    let (view, _) = missing_reference_view();
    let options = CompilerOptions {
        minification: false,
        ignore_missing_classes: true,
        ..CompilerOptions::default()
    };
    let driver = Driver::new(vec![pin_method("LC;", "m")], options).unwrap();
    let result = driver.compile(view).unwrap();

    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].severity, dx_driver::Severity::Warning);
}

/// An eligible enum unboxes to ordinal ints with per-slot prototype
/// rewrites
#[test]
fn eligible_enum_unboxes_to_ints() -> anyhow::Result<()> {
    let mut view = test_view();
    let pool = view.pool_arc();
    let enum_ty = pool.intern_type("LE;");
    let constant_flags = AccessFlags::empty()
        .with(AccessFlags::STATIC)
        .with(AccessFlags::FINAL)
        .with(AccessFlags::ENUM);
    let first = FieldReference::new(enum_ty, pool.intern_name("A"), enum_ty);
    let second = FieldReference::new(enum_ty, pool.intern_name("B"), enum_ty);
    let init = MethodReference::new(
        enum_ty,
        MethodSignature::new(pool.init_name(), [], pool.void_type()),
    );

    let mut enum_class = ClassDefinition::new(
        enum_ty,
        Some(pool.object_type()),
        AccessFlags::empty()
            .with(AccessFlags::FINAL)
            .with(AccessFlags::ENUM),
    );
    enum_class
        .fields
        .push(FieldDefinition::new(first, constant_flags));
    enum_class
        .fields
        .push(FieldDefinition::new(second, constant_flags));
    let mut ctor = BodyBuilder::new();
    let receiver = ctor.argument(0, enum_ty);
    ctor.invoke(InvokeKind::Direct, object_init(&pool), &[receiver]);
    enum_class.methods.push(MethodDefinition::with_code(
        init.clone(),
        AccessFlags::empty(),
        ctor.return_void(),
    ));
    let mut clinit = BodyBuilder::new();
    let a_value = clinit.new_instance(enum_ty);
    clinit.invoke(InvokeKind::Direct, init.clone(), &[a_value]);
    clinit.static_put(first, a_value);
    let b_value = clinit.new_instance(enum_ty);
    clinit.invoke(InvokeKind::Direct, init, &[b_value]);
    clinit.static_put(second, b_value);
    enum_class.methods.push(MethodDefinition::with_code(
        MethodReference::new(
            enum_ty,
            MethodSignature::new(pool.clinit_name(), [], pool.void_type()),
        ),
        AccessFlags::empty().with(AccessFlags::STATIC),
        clinit.return_void(),
    ));
    view.add_program_class(enum_class)?;

    let util_ty = pool.intern_type("LUtil;");
    let id = MethodReference::new(
        util_ty,
        MethodSignature::new(pool.intern_name("id"), [enum_ty], pool.int_type()),
    );
    let mut id_body = BodyBuilder::new();
    let zero = id_body.const_int(0);
    let mut util = ClassDefinition::new(
        util_ty,
        Some(pool.object_type()),
        AccessFlags::empty().with(AccessFlags::PUBLIC),
    );
    util.methods.push(static_method(
        &pool,
        util_ty,
        "id",
        [enum_ty],
        pool.int_type(),
        id_body.return_value(zero),
    ));
    view.add_program_class(util)?;

    let main_ty = pool.intern_type("LMain;");
    let mut body = BodyBuilder::new();
    let constant = body.static_get(second);
    let result_value = body.invoke_with_result(InvokeKind::Static, id.clone(), &[constant]);
    let mut main_class =
        ClassDefinition::new(main_ty, Some(pool.object_type()), AccessFlags::empty());
    main_class.methods.push(static_method(
        &pool,
        main_ty,
        "main",
        [],
        pool.int_type(),
        body.return_value(result_value),
    ));
    view.add_program_class(main_class)?;

    let options = CompilerOptions {
        minification: false,
        enable_class_inlining: false,
        ..CompilerOptions::default()
    };
    let driver = Driver::new(vec![pin_method("LMain;", "main")], options)?;
    let result = driver.compile(view)?;

    // the enum is gone and the signature mentions int instead
    assert!(result.view.program_class(enum_ty).is_none());
    let lookup = result.lens_stack.map_method(&id);
    assert_eq!(
        lookup.reference.signature.parameters.as_slice(),
        &[pool.int_type()]
    );
    let rewrites = lookup.prototype_changes.rewritten_arguments();
    assert_eq!(rewrites.len(), 1);
    assert_eq!(rewrites[0].index, 0);
    assert_eq!(rewrites[0].from, enum_ty);
    assert_eq!(rewrites[0].to, pool.int_type());

    // the constant read became the ordinal of B
    let main_code = result.view.program_class(main_ty).unwrap().methods[0]
        .code
        .as_ref()
        .unwrap();
    assert!(main_code
        .blocks()
        .iter()
        .flat_map(|b| &b.instructions)
        .any(|i| matches!(i.kind, InstructionKind::ConstInt { value: 1 })));
    Ok(())
}

/// Proto normalization sorts parameters and reorders call sites
#[test]
fn proto_normalization_reorders_arguments() -> anyhow::Result<()> {
    let mut view = test_view();
    let pool = view.pool_arc();
    let util_ty = pool.intern_type("LUtil;");
    let two = MethodReference::new(
        util_ty,
        MethodSignature::new(
            pool.intern_name("two"),
            [pool.object_type(), pool.int_type()],
            pool.void_type(),
        ),
    );
    let mut two_body = BodyBuilder::new();
    let _object_arg = two_body.argument(0, pool.object_type());
    let _int_arg = two_body.argument(1, pool.int_type());
    let mut util = ClassDefinition::new(
        util_ty,
        Some(pool.object_type()),
        AccessFlags::empty().with(AccessFlags::PUBLIC),
    );
    util.methods.push(static_method(
        &pool,
        util_ty,
        "two",
        [pool.object_type(), pool.int_type()],
        pool.void_type(),
        two_body.return_void(),
    ));
    view.add_program_class(util)?;

    let main_ty = pool.intern_type("LMain;");
    let mut body = BodyBuilder::new();
    let object_value = body.const_null();
    let int_value = body.const_int(5);
    body.invoke(InvokeKind::Static, two.clone(), &[object_value, int_value]);
    let mut main_class =
        ClassDefinition::new(main_ty, Some(pool.object_type()), AccessFlags::empty());
    main_class.methods.push(static_method(
        &pool,
        main_ty,
        "main",
        [],
        pool.void_type(),
        body.return_void(),
    ));
    view.add_program_class(main_class)?;

    let options = CompilerOptions {
        minification: false,
        ..CompilerOptions::default()
    };
    let driver = Driver::new(vec![pin_method("LMain;", "main")], options)?;
    let result = driver.compile(view)?;

    // "I" sorts before "Ljava/lang/Object;"
    let lookup = result.lens_stack.map_method(&two);
    assert_eq!(
        lookup.reference.signature.parameters.as_slice(),
        &[pool.int_type(), pool.object_type()]
    );
    assert_eq!(
        lookup.prototype_changes.argument_permutation(),
        Some([1, 0].as_slice())
    );

    // the caller now passes the int first
    let main_code = result.view.program_class(main_ty).unwrap().methods[0]
        .code
        .as_ref()
        .unwrap();
    assert_eq!(main_code.verify(), Ok(()));
    let invoke_arguments = main_code
        .blocks()
        .iter()
        .flat_map(|b| &b.instructions)
        .find_map(|i| match &i.kind {
            InstructionKind::Invoke { arguments, .. } => Some(arguments.clone()),
            _ => None,
        })
        .expect("the call survives");
    let first_defined_by = main_code
        .blocks()
        .iter()
        .flat_map(|b| &b.instructions)
        .find(|i| i.dest == Some(invoke_arguments[0]))
        .unwrap();
    assert_eq!(
        first_defined_by.kind,
        InstructionKind::ConstInt { value: 5 }
    );
    Ok(())
}

/// Interface `IFace { m()V }`, implementor `Impl`, and a main that
/// dispatches through the interface
fn interface_program(view: &mut ApplicationView) -> (Type, Type, Type, MethodReference) {
    let pool = view.pool_arc();
    let iface_ty = pool.intern_type("LIFace;");
    let impl_ty = pool.intern_type("LImpl;");
    let m_signature = MethodSignature::new(pool.intern_name("m"), [], pool.void_type());
    let iface_m = MethodReference::new(iface_ty, m_signature.clone());

    let mut iface = ClassDefinition::new(
        iface_ty,
        Some(pool.object_type()),
        AccessFlags::empty()
            .with(AccessFlags::PUBLIC)
            .with(AccessFlags::INTERFACE)
            .with(AccessFlags::ABSTRACT),
    );
    iface.methods.push(MethodDefinition::new(
        iface_m.clone(),
        AccessFlags::empty()
            .with(AccessFlags::PUBLIC)
            .with(AccessFlags::ABSTRACT),
    ));
    view.add_program_class(iface).unwrap();

    let mut implementor = ClassDefinition::new(
        impl_ty,
        Some(pool.object_type()),
        AccessFlags::empty().with(AccessFlags::PUBLIC),
    );
    implementor.interfaces.push(iface_ty);
    let mut ctor = BodyBuilder::new();
    let receiver = ctor.argument(0, impl_ty);
    ctor.invoke(InvokeKind::Direct, object_init(&pool), &[receiver]);
    let impl_init = MethodReference::new(
        impl_ty,
        MethodSignature::new(pool.init_name(), [], pool.void_type()),
    );
    implementor.methods.push(MethodDefinition::with_code(
        impl_init.clone(),
        AccessFlags::empty().with(AccessFlags::PUBLIC),
        ctor.return_void(),
    ));
    let m_body = BodyBuilder::new();
    implementor.methods.push(MethodDefinition::with_code(
        MethodReference::new(impl_ty, m_signature),
        AccessFlags::empty().with(AccessFlags::PUBLIC),
        m_body.return_void(),
    ));
    view.add_program_class(implementor).unwrap();

    let main_ty = pool.intern_type("LMain;");
    let mut body = BodyBuilder::new();
    let object = body.new_instance(impl_ty);
    body.invoke(InvokeKind::Direct, impl_init, &[object]);
    body.invoke(InvokeKind::Interface, iface_m.clone(), &[object]);
    let mut main_class =
        ClassDefinition::new(main_ty, Some(pool.object_type()), AccessFlags::empty());
    main_class.methods.push(static_method(
        &pool,
        main_ty,
        "main",
        [],
        pool.void_type(),
        body.return_void(),
    ));
    view.add_program_class(main_class).unwrap();
    (iface_ty, impl_ty, main_ty, iface_m)
}

/// A method reachable only through interface dispatch survives tree
/// shaking
#[test]
fn interface_dispatch_keeps_overrides_live() {
    let mut view = test_view();
    let pool = view.pool_arc();
    let (iface_ty, impl_ty, main_ty, iface_m) = interface_program(&mut view);

    let driver = Driver::new(vec![pin_method("LMain;", "main")], no_minify()).unwrap();
    let result = driver.compile(view).unwrap();

    let m_signature = MethodSignature::new(pool.intern_name("m"), [], pool.void_type());
    let implementor = result
        .view
        .program_class(impl_ty)
        .expect("the implementor survives");
    assert!(implementor.has_method(&m_signature));
    let iface = result
        .view
        .program_class(iface_ty)
        .expect("the interface survives");
    assert!(iface.has_method(&m_signature));

    // the call site still dispatches through the interface
    let main_code = result.view.program_class(main_ty).unwrap().methods[0]
        .code
        .as_ref()
        .unwrap();
    assert!(main_code.references().contains(&IrReference::Method(iface_m)));
}

/// Implementors of one interface signature keep a consistent name
/// under minification
#[test]
fn interface_overrides_keep_their_names_under_minification() {
    let mut view = test_view();
    let pool = view.pool_arc();
    let (iface_ty, impl_ty, _, iface_m) = interface_program(&mut view);

    let driver = Driver::new(
        vec![pin_method("LMain;", "main")],
        CompilerOptions::default(),
    )
    .unwrap();
    let result = driver.compile(view).unwrap();

    // the classes rename, the interface-declared method does not
    let iface_lookup = result.lens_stack.map_method(&iface_m);
    assert_ne!(iface_lookup.reference.holder, iface_ty);
    assert_eq!(
        pool.name_text(iface_lookup.reference.signature.name).as_ref(),
        "m"
    );
    let impl_m = MethodReference::new(
        impl_ty,
        MethodSignature::new(pool.intern_name("m"), [], pool.void_type()),
    );
    let impl_lookup = result.lens_stack.map_method(&impl_m);
    assert_ne!(impl_lookup.reference.holder, impl_ty);
    assert_eq!(
        pool.name_text(impl_lookup.reference.signature.name).as_ref(),
        "m"
    );

    // dispatch stays consistent: the implementor's renamed class still
    // declares the interface signature under its original name
    let renamed_impl = result
        .view
        .program_class(impl_lookup.reference.holder)
        .expect("the renamed implementor exists");
    assert!(renamed_impl.has_method(&impl_lookup.reference.signature));
}

/// Vertical merging moves the folded superclass's interfaces onto the
/// subclass
#[test]
fn vertical_merge_preserves_interface_conformance() {
    let mut view = test_view();
    let pool = view.pool_arc();
    let iface_ty = pool.intern_type("LIFace;");
    view.add_program_class(ClassDefinition::new(
        iface_ty,
        Some(pool.object_type()),
        AccessFlags::empty()
            .with(AccessFlags::PUBLIC)
            .with(AccessFlags::INTERFACE)
            .with(AccessFlags::ABSTRACT),
    ))
    .unwrap();

    let base_ty = pool.intern_type("LBase;");
    let mut base = ClassDefinition::new(
        base_ty,
        Some(pool.object_type()),
        AccessFlags::empty().with(AccessFlags::PUBLIC),
    );
    base.interfaces.push(iface_ty);
    view.add_program_class(base).unwrap();

    let target_ty = pool.intern_type("LTarget;");
    let field = FieldReference::new(target_ty, pool.intern_name("x"), pool.int_type());
    let mut target = ClassDefinition::new(target_ty, Some(base_ty), AccessFlags::empty());
    target.fields.push(FieldDefinition::new(
        field,
        AccessFlags::empty().with(AccessFlags::FINAL),
    ));
    target.methods.push(dx_test_utils::constructor_storing_field(
        &pool,
        target_ty,
        field,
        pool.int_type(),
    ));
    view.add_program_class(target).unwrap();

    let main_ty = pool.intern_type("LMain;");
    let mut body = BodyBuilder::new();
    let object = body.new_instance(target_ty);
    let seven = body.const_int(7);
    body.invoke(
        InvokeKind::Direct,
        MethodReference::new(
            target_ty,
            MethodSignature::new(pool.init_name(), [pool.int_type()], pool.void_type()),
        ),
        &[object, seven],
    );
    let mut main_class =
        ClassDefinition::new(main_ty, Some(pool.object_type()), AccessFlags::empty());
    main_class.methods.push(static_method(
        &pool,
        main_ty,
        "main",
        [],
        pool.void_type(),
        body.return_void(),
    ));
    view.add_program_class(main_class).unwrap();

    let options = CompilerOptions {
        minification: false,
        enable_class_inlining: false,
        ..CompilerOptions::default()
    };
    let driver = Driver::new(vec![pin_method("LMain;", "main")], options).unwrap();
    let result = driver.compile(view).unwrap();

    assert!(result.view.program_class(base_ty).is_none());
    assert_eq!(result.lens_stack.map_type(base_ty), target_ty);
    let merged = result
        .view
        .program_class(target_ty)
        .expect("the subclass survives the fold");
    assert_eq!(merged.superclass, Some(pool.object_type()));
    assert!(merged.interfaces.contains(&iface_ty));
}

/// Zero-rule passthrough: with everything disabled the program comes
/// out structurally identical
#[test]
fn passthrough_compilation_is_idempotent() {
    let mut view = test_view();
    let pool = view.pool_arc();
    let _ = two_holders_and_main(&mut view);

    let before: Vec<(String, usize, usize)> = view
        .sorted_program_types()
        .iter()
        .map(|ty| {
            let class = view.program_class(*ty).unwrap();
            (
                pool.type_descriptor(*ty).to_string(),
                class.fields.len(),
                class.methods.len(),
            )
        })
        .collect();

    let driver = Driver::new(vec![], CompilerOptions::passthrough()).unwrap();
    let result = driver.compile(view).unwrap();

    let after: Vec<(String, usize, usize)> = result
        .view
        .sorted_program_types()
        .iter()
        .map(|ty| {
            let class = result.view.program_class(*ty).unwrap();
            (
                pool.type_descriptor(*ty).to_string(),
                class.fields.len(),
                class.methods.len(),
            )
        })
        .collect();
    assert_eq!(before, after);
    assert!(result.lens_stack.is_empty());
    assert!(result.mapping.is_empty());
}

/// Rename→retrace round trip through the residual mapping
#[test]
fn minified_names_retrace_to_originals() {
    let mut view = test_view();
    let pool = view.pool_arc();
    let helper_holder = pool.intern_type("Lcom/example/Util;");
    let helper = MethodReference::new(
        helper_holder,
        MethodSignature::new(pool.intern_name("helper"), [], pool.int_type()),
    );
    let mut helper_body = BodyBuilder::new();
    let nine = helper_body.const_int(9);
    let mut util = ClassDefinition::new(
        helper_holder,
        Some(pool.object_type()),
        AccessFlags::empty().with(AccessFlags::PUBLIC),
    );
    util.methods.push(static_method(
        &pool,
        helper_holder,
        "helper",
        [],
        pool.int_type(),
        helper_body.return_value(nine),
    ));
    view.add_program_class(util).unwrap();

    let main_ty = pool.intern_type("LMain;");
    let mut body = BodyBuilder::new();
    let value = body.invoke_with_result(InvokeKind::Static, helper.clone(), &[]);
    let mut main_class =
        ClassDefinition::new(main_ty, Some(pool.object_type()), AccessFlags::empty());
    main_class.methods.push(static_method(
        &pool,
        main_ty,
        "main",
        [],
        pool.int_type(),
        body.return_value(value),
    ));
    view.add_program_class(main_class).unwrap();

    let driver = Driver::new(
        vec![pin_method("LMain;", "main")],
        CompilerOptions::default(),
    )
    .unwrap();
    let result = driver.compile(view).unwrap();

    let lookup = result.lens_stack.map_method(&helper);
    assert_ne!(lookup.reference, helper, "the helper was renamed");
    let obfuscated_class =
        dx_lens::descriptor_to_java(&pool.type_descriptor(lookup.reference.holder));
    let obfuscated_method = pool.name_text(lookup.reference.signature.name).to_string();

    let (original_class, original_method) = result
        .mapping
        .retrace_frame(&obfuscated_class, &obfuscated_method)
        .expect("the frame retraces");
    assert_eq!(original_class, "com.example.Util");
    assert_eq!(original_method, "helper");

    // the rendered mapping mentions the original class name
    assert!(result.mapping.render().contains("com.example.Util ->"));
}
