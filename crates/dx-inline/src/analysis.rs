//! Eligibility analyses
//!
//! Populate the optimization-info facts the class inliner consumes:
//! receiver-escape behavior, parameter usage, and trivial class
//! initializer shapes. Each analysis is a pure function of IR state and
//! records its result through the per-method monitor; eligibility checks
//! later read the cached facts without re-running anything.

use dx_ir::{
    ApplicationView, ClassDefinition, ConstArgument, FieldReference, InstructionKind, InvokeKind,
    IrCode, MethodDefinition, ParameterUsage, SymbolPool, TrivialInitializerInfo, Value,
};
use tracing::trace;

/// Analyze how an instance method treats its receiver
///
/// Records `does_not_leak_receiver` (no use lets the receiver escape,
/// returning it excepted) and `returns_receiver` (every return returns
/// it).
pub fn analyze_receiver_behavior(method: &MethodDefinition, pool: &SymbolPool) {
    if method.flags.is_static() || method.is_class_initializer(pool) {
        return;
    }
    let Some(code) = &method.code else { return };
    let Some(receiver) = argument_value(code, 0) else {
        // a body that never loads its receiver cannot leak it
        method.refine_optimization_info(|info| {
            info.refine_does_not_leak_receiver(true);
            info.refine_returns_receiver(false);
        });
        return;
    };

    let mut leaks = false;
    let mut returns = 0usize;
    let mut returns_receiver = 0usize;
    for block in code.blocks() {
        for phi in &block.phis {
            if phi.operands.iter().any(|(_, value)| *value == receiver) {
                leaks = true;
            }
        }
        for instruction in &block.instructions {
            match &instruction.kind {
                // field reads on any object never leak the receiver
                InstructionKind::InstanceGet { .. } => {}
                InstructionKind::InstancePut { value, .. } => {
                    if *value == receiver {
                        leaks = true;
                    }
                }
                InstructionKind::Return { value } => {
                    returns += 1;
                    if *value == Some(receiver) {
                        returns_receiver += 1;
                    }
                }
                other => {
                    if other.used_values().contains(&receiver) {
                        leaks = true;
                    }
                }
            }
        }
    }

    method.refine_optimization_info(|info| {
        info.refine_does_not_leak_receiver(!leaks);
        info.refine_returns_receiver(returns > 0 && returns == returns_receiver);
    });
}

/// Analyze how a method uses each declared parameter
///
/// Runs after [`analyze_receiver_behavior`] has visited the program, so
/// non-escaping-receiver classification can consult callee facts.
pub fn analyze_parameter_usage(method: &MethodDefinition, view: &ApplicationView) {
    let Some(code) = &method.code else { return };
    let declared = method.reference.signature.arity();
    let receiver_slots = usize::from(!method.flags.is_static());

    let mut usage = Vec::with_capacity(declared);
    for slot in 0..declared {
        let index = slot + receiver_slots;
        let Some(value) = argument_value(code, index) else {
            usage.push(ParameterUsage::Unused);
            continue;
        };
        usage.push(classify_value_usage(code, value, view));
    }
    method.refine_optimization_info(|info| info.refine_parameter_usage(usage));
}

fn classify_value_usage(code: &IrCode, value: Value, view: &ApplicationView) -> ParameterUsage {
    let mut used = false;
    for block in code.blocks() {
        for phi in &block.phis {
            if phi.operands.iter().any(|(_, operand)| *operand == value) {
                return ParameterUsage::Escapes;
            }
        }
        for instruction in &block.instructions {
            let uses = instruction.kind.used_values();
            if !uses.contains(&value) {
                continue;
            }
            used = true;
            match &instruction.kind {
                InstructionKind::Invoke {
                    kind,
                    method,
                    arguments,
                } if !matches!(kind, InvokeKind::Static)
                    && arguments.first() == Some(&value)
                    && arguments.iter().skip(1).all(|a| *a != value) =>
                {
                    let non_escaping = view
                        .resolve_method(method)
                        .map(|target| target.optimization_info().does_not_leak_receiver())
                        .unwrap_or(false);
                    if !non_escaping {
                        return ParameterUsage::Escapes;
                    }
                }
                _ => return ParameterUsage::Escapes,
            }
        }
    }
    if used {
        ParameterUsage::NonEscapingReceiver
    } else {
        ParameterUsage::Unused
    }
}

/// Detect the trivial-class-initializer shape and cache it on the
/// initializer's optimization-info
///
/// Trivial means: allocate one instance of the enclosing class, call a
/// constructor on it with constant or class-literal arguments, store
/// the instance into a static final field of the enclosing class, and
/// do nothing else.
pub fn analyze_class_initializer(class: &ClassDefinition, pool: &SymbolPool) {
    let Some(clinit) = class.class_initializer(pool) else {
        return;
    };
    let Some(info) = detect_trivial_initializer(class, clinit, pool) else {
        return;
    };
    trace!(
        field = %info.field.describe(pool),
        "trivial class initializer detected"
    );
    clinit.refine_optimization_info(|record| record.refine_trivial_initializer(info));
}

fn detect_trivial_initializer(
    class: &ClassDefinition,
    clinit: &MethodDefinition,
    pool: &SymbolPool,
) -> Option<TrivialInitializerInfo> {
    let code = clinit.code.as_ref()?;
    if code.blocks().len() != 1 {
        return None;
    }
    let block = &code.blocks()[0];

    let mut allocated: Option<Value> = None;
    let mut constants: Vec<(Value, ConstArgument)> = Vec::new();
    let mut constructor: Option<(dx_ir::MethodReference, Vec<ConstArgument>)> = None;
    let mut stored: Option<FieldReference> = None;

    for instruction in &block.instructions {
        match &instruction.kind {
            InstructionKind::NewInstance { ty } if *ty == class.ty && allocated.is_none() => {
                allocated = instruction.dest;
            }
            InstructionKind::ConstInt { value } => {
                constants.push((instruction.dest?, ConstArgument::Int(*value)));
            }
            InstructionKind::ConstNull => {
                constants.push((instruction.dest?, ConstArgument::Null));
            }
            InstructionKind::ConstClass { ty } => {
                constants.push((instruction.dest?, ConstArgument::Class(*ty)));
            }
            InstructionKind::ConstString { value } => {
                constants.push((instruction.dest?, ConstArgument::String(*value)));
            }
            InstructionKind::Invoke {
                kind: InvokeKind::Direct,
                method,
                arguments,
            } if method.is_instance_initializer(pool) => {
                if method.holder == class.ty {
                    // the instance's own constructor: receiver must be the
                    // allocation, every other argument a recorded constant
                    if constructor.is_some() || arguments.first().copied() != allocated {
                        return None;
                    }
                    let mut resolved = Vec::new();
                    for argument in arguments.iter().skip(1) {
                        let constant = constants
                            .iter()
                            .find(|(value, _)| value == argument)
                            .map(|(_, c)| *c)?;
                        resolved.push(constant);
                    }
                    constructor = Some((method.clone(), resolved));
                } else {
                    return None;
                }
            }
            InstructionKind::StaticPut { field, value } => {
                if stored.is_some()
                    || Some(*value) != allocated
                    || field.holder != class.ty
                    || field.ty != class.ty
                {
                    return None;
                }
                let declared = class.field(field.name, field.ty)?;
                if !declared.flags.is_static() || !declared.flags.is_final() {
                    return None;
                }
                stored = Some(*field);
            }
            InstructionKind::Return { value: None } => {}
            _ => return None,
        }
    }

    let (constructor, arguments) = constructor?;
    Some(TrivialInitializerInfo {
        field: stored?,
        constructor,
        arguments,
    })
}

/// Value defined by the `Argument` instruction for a slot, if present
#[must_use]
pub fn argument_value(code: &IrCode, index: usize) -> Option<Value> {
    for block in code.blocks() {
        for instruction in &block.instructions {
            if let InstructionKind::Argument { index: slot, .. } = &instruction.kind {
                if usize::from(*slot) == index {
                    return instruction.dest;
                }
            }
        }
    }
    None
}
