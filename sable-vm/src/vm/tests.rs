use super::*;
use pretty_assertions::assert_eq;
use sable_ir::{Builder, CallConv, HighLevelBuilderExt, SymbolRef, Type, UserValue};

fn build(f: impl FnOnce(&mut Builder)) -> Assembly {
    let mut b = Builder::new("test");
    f(&mut b);
    b.check().unwrap()
}

fn recursive_factorial(b: &mut Builder) {
    let fact = b.define_proc("fact");
    b.set_return_type(Type::i32()).unwrap();
    let n = b.define_parameter(Type::i32()).unwrap();
    let fact_ref = b.proc_value(fact).unwrap();

    let nc = n.clone();
    b.if_then(|b| b.cmp_le_eq(nc, Value::i32(1)), |b| b.ret(Some(Value::i32(1))))
        .unwrap();
    let m = b.sub(n.clone(), Value::i32(1)).unwrap();
    let r = b.call(fact_ref, vec![m]).unwrap();
    let product = b.mul(n, r).unwrap();
    b.ret(Some(product)).unwrap();
}

#[test]
fn test_const_return() {
    let asm = build(|b| {
        b.define_proc("entry");
        b.set_return_type(Type::i32()).unwrap();
        b.ret(Some(Value::i32(263))).unwrap();
    });
    let mut vm = VirtualMachine::new(&asm).unwrap();
    assert_eq!(vm.execute("entry", &[]).unwrap(), Some(Value::i32(263)));
    assert_eq!(vm.state(), &VMState::Halted);
    assert_eq!(vm.cycles(), 1);
}

#[test]
fn test_recursive_factorial() {
    let asm = build(recursive_factorial);
    let mut vm = VirtualMachine::new(&asm).unwrap();
    for (n, expected) in [(1, 1), (2, 2), (3, 6), (4, 24), (5, 120)] {
        let result = vm.execute("fact", &[Value::i32(n)]).unwrap();
        assert_eq!(result, Some(Value::i32(expected)), "fact({})", n);
    }
}

#[test]
fn test_iterative_factorial() {
    let asm = build(|b| {
        b.define_proc("fact");
        b.set_return_type(Type::i32()).unwrap();
        let n = b.define_parameter(Type::i32()).unwrap();
        let acc = b.alloc(Type::ptr(Type::i32())).unwrap();
        let i = b.alloc(Type::ptr(Type::i32())).unwrap();
        b.store(acc.clone(), Value::i32(1)).unwrap();
        b.store(i.clone(), n).unwrap();

        let cond = b.append_basic_block("loop_condition").unwrap();
        let body = b.append_basic_block("loop").unwrap();
        let end = b.append_basic_block("end_loop").unwrap();
        b.jmp(cond).unwrap();

        b.position_at_end(cond).unwrap();
        let iv = b.load(i.clone()).unwrap();
        let more = b.cmp_gr(iv, Value::i32(1)).unwrap();
        b.jmp_if(more, body, end).unwrap();

        b.position_at_end(body).unwrap();
        let av = b.load(acc.clone()).unwrap();
        let iv = b.load(i.clone()).unwrap();
        let av = b.mul(av, iv.clone()).unwrap();
        b.store(acc.clone(), av).unwrap();
        let iv = b.sub(iv, Value::i32(1)).unwrap();
        b.store(i, iv).unwrap();
        b.jmp(cond).unwrap();

        b.position_at_end(end).unwrap();
        let result = b.load(acc).unwrap();
        b.ret(Some(result)).unwrap();
    });

    let mut vm = VirtualMachine::new(&asm).unwrap();
    assert_eq!(vm.execute("fact", &[Value::i32(5)]).unwrap(), Some(Value::i32(120)));
}

#[test]
fn test_void_proc_returns_none() {
    let asm = build(|b| {
        let callee = b.define_proc("nothing");
        b.ret(None).unwrap();
        let callee = b.proc_value(callee).unwrap();

        b.define_proc("main");
        b.set_return_type(Type::i32()).unwrap();
        b.call(callee, vec![]).unwrap();
        b.ret(Some(Value::i32(0))).unwrap();
    });
    let mut vm = VirtualMachine::new(&asm).unwrap();
    assert_eq!(vm.execute("nothing", &[]).unwrap(), None);
    assert_eq!(vm.execute("main", &[]).unwrap(), Some(Value::i32(0)));
}

#[test]
fn test_globals_and_constants() {
    let asm = build(|b| {
        let limit = b.define_const("limit", Value::i32(40));
        let alias = b.define_const("alias", limit);
        let counter = b.define_global("counter", Type::i32(), Some(Value::i32(2)));
        b.define_proc("main");
        b.set_return_type(Type::i32()).unwrap();
        let c = b.load(counter.clone()).unwrap();
        let sum = b.add(c, alias).unwrap();
        b.store(counter.clone(), sum).unwrap();
        let again = b.load(counter).unwrap();
        b.ret(Some(again)).unwrap();
    });
    let mut vm = VirtualMachine::new(&asm).unwrap();
    assert_eq!(vm.execute("main", &[]).unwrap(), Some(Value::i32(42)));
    // Global storage persists across calls on the same VM
    assert_eq!(vm.execute("main", &[]).unwrap(), Some(Value::i32(82)));
}

static HOST_COUNTER: i32 = 17;

#[test]
fn test_extern_data() {
    let asm = build(|b| {
        let ext = b.define_extern("host_counter", Type::i32(), "host");
        b.define_proc("main");
        b.set_return_type(Type::i32()).unwrap();
        let doubled = b.add(ext.clone(), ext).unwrap();
        b.ret(Some(doubled)).unwrap();
    });

    let table = SymbolTable::new().with("host_counter", NativeSymbol::from_static(&HOST_COUNTER));
    let mut vm = VirtualMachine::with_options(&asm, VmOptions::default(), &table).unwrap();
    assert_eq!(vm.execute("main", &[]).unwrap(), Some(Value::i32(34)));

    let mut unbound = VirtualMachine::new(&asm).unwrap();
    assert!(matches!(
        unbound.execute("main", &[]),
        Err(CompilerError::Runtime { .. })
    ));
}

#[test]
fn test_extern_call_is_unsupported() {
    let asm = build(|b| {
        let puts = b.define_extern("puts", Type::proc(CallConv::Cdecl, vec![], Type::i32()), "libc");
        b.define_proc("main");
        b.set_return_type(Type::i32()).unwrap();
        let r = b.call(puts, vec![]).unwrap();
        b.ret(Some(r)).unwrap();
    });
    let mut vm = VirtualMachine::new(&asm).unwrap();
    assert!(vm.execute("main", &[]).unwrap_err().is_unsupported());
    assert!(matches!(vm.state(), VMState::Error(_)));
}

#[test]
fn test_element_ptr_offsets() {
    let make = |field: u32| {
        build(move |b| {
            let point = b.define_struct("point", vec![Type::i32(), Type::i32()]);
            b.define_proc("main");
            b.set_return_type(Type::i32()).unwrap();
            let p = b.alloc(Type::ptr(point)).unwrap();
            let f = b.element_ptr(p, field).unwrap();
            b.store(f.clone(), Value::i32(7)).unwrap();
            let v = b.load(f).unwrap();
            b.ret(Some(v)).unwrap();
        })
    };

    let first = make(0);
    let mut vm = VirtualMachine::new(&first).unwrap();
    assert_eq!(vm.execute("main", &[]).unwrap(), Some(Value::i32(7)));

    let second = make(1);
    let mut vm = VirtualMachine::new(&second).unwrap();
    assert!(vm.execute("main", &[]).unwrap_err().is_unsupported());
}

#[test]
fn test_division_by_zero() {
    let asm = build(|b| {
        b.define_proc("main");
        b.set_return_type(Type::i32()).unwrap();
        let x = b.define_parameter(Type::i32()).unwrap();
        let q = b.div(Value::i32(10), x).unwrap();
        b.ret(Some(q)).unwrap();
    });
    let mut vm = VirtualMachine::new(&asm).unwrap();
    assert_eq!(vm.execute("main", &[Value::i32(3)]).unwrap(), Some(Value::i32(3)));
    let err = vm.execute("main", &[Value::i32(0)]).unwrap_err();
    assert!(matches!(err, CompilerError::Runtime { .. }));
}

#[test]
fn test_integer_semantics() {
    let asm = build(|b| {
        b.define_proc("wrap");
        b.set_return_type(Type::i8()).unwrap();
        let sum = b.add(Value::i8(120), Value::i8(10)).unwrap();
        b.ret(Some(sum)).unwrap();

        b.define_proc("unsigned_gr");
        b.set_return_type(Type::i32()).unwrap();
        let c = b.cmp_gr(Value::u32(u32::MAX), Value::u32(1)).unwrap();
        b.ret(Some(c)).unwrap();

        b.define_proc("signed_shr");
        b.set_return_type(Type::i32()).unwrap();
        let s = b.shr(Value::i32(-16), Value::i32(2)).unwrap();
        b.ret(Some(s)).unwrap();

        b.define_proc("bits");
        b.set_return_type(Type::i32()).unwrap();
        let x = b.bit_xor(Value::i32(0b1100), Value::i32(0b1010)).unwrap();
        let x = b.shl(x, Value::i32(1)).unwrap();
        let x = b.modulo(x, Value::i32(5)).unwrap();
        b.ret(Some(x)).unwrap();
    });
    let mut vm = VirtualMachine::new(&asm).unwrap();
    assert_eq!(vm.execute("wrap", &[]).unwrap(), Some(Value::i8(-126)));
    assert_eq!(vm.execute("unsigned_gr", &[]).unwrap(), Some(Value::i32(1)));
    assert_eq!(vm.execute("signed_shr", &[]).unwrap(), Some(Value::i32(-4)));
    assert_eq!(vm.execute("bits", &[]).unwrap(), Some(Value::i32(2)));
}

#[test]
fn test_cast_to_user_wraps_value() {
    let asm = build(|b| {
        b.define_proc("main");
        b.set_return_type(Type::user("Boxed")).unwrap();
        let boxed = b.cast(Value::i32(5), Type::user("Boxed")).unwrap();
        b.ret(Some(boxed)).unwrap();
    });
    let mut vm = VirtualMachine::new(&asm).unwrap();
    let Some(Value::User(user)) = vm.execute("main", &[]).unwrap() else {
        panic!("expected a user value");
    };
    assert_eq!(user, UserValue::new("Boxed", Value::i32(5)));
    assert_eq!(user.downcast_ref::<Value>(), Some(&Value::i32(5)));
}

#[test]
fn test_user_equality_in_vm() {
    let asm = build(|b| {
        b.define_proc("same");
        b.set_return_type(Type::i32()).unwrap();
        let a = b.define_parameter(Type::user("Tag")).unwrap();
        let c = b.cmp_eq(a, Value::user("Tag", "red".to_string())).unwrap();
        b.ret(Some(c)).unwrap();
    });
    let mut vm = VirtualMachine::new(&asm).unwrap();
    let red = Value::user("Tag", "red".to_string());
    let blue = Value::user("Tag", "blue".to_string());
    assert_eq!(vm.execute("same", &[red]).unwrap(), Some(Value::i32(1)));
    assert_eq!(vm.execute("same", &[blue]).unwrap(), Some(Value::i32(0)));
}

#[test]
fn test_cycle_limit() {
    let asm = build(|b| {
        b.define_proc("spin");
        let top = b.define_basic_block("top").unwrap();
        b.position_at_end(sable_ir::BlockId(0)).unwrap();
        b.jmp(top).unwrap();
        b.position_at_end(top).unwrap();
        b.jmp(top).unwrap();
    });
    let options = VmOptions {
        max_cycles: Some(100),
        trace: false,
    };
    let mut vm = VirtualMachine::with_options(&asm, options, &SymbolTable::new()).unwrap();
    let err = vm.execute("spin", &[]).unwrap_err();
    assert!(matches!(err, CompilerError::ResourceExhausted { .. }));
    assert_eq!(vm.cycles(), 101);
}

#[test]
fn test_stepping() {
    let asm = build(recursive_factorial);
    let mut vm = VirtualMachine::new(&asm).unwrap();
    assert!(vm.step().is_err());

    let fact = asm.proc_by_name("fact").unwrap();
    vm.start(fact, &[Value::i32(2)]).unwrap();
    assert_eq!(vm.state(), &VMState::Running);
    assert_eq!(vm.frames().len(), 1);

    let mut max_depth = 1;
    while vm.state() == &VMState::Running {
        vm.step().unwrap();
        max_depth = max_depth.max(vm.frames().len());
    }
    assert_eq!(max_depth, 2);
    assert_eq!(vm.result(), Some(&Value::i32(2)));
}

#[test]
fn test_argument_checks() {
    let asm = build(recursive_factorial);
    let mut vm = VirtualMachine::new(&asm).unwrap();
    assert!(vm.execute("fact", &[]).is_err());
    assert!(vm.execute("fact", &[Value::i8(3)]).is_err());
    assert!(vm.execute("missing", &[]).is_err());
}

#[test]
fn test_assembly_shared_between_machines() {
    let asm = build(recursive_factorial);
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (1..=5)
            .map(|n| {
                let asm = &asm;
                scope.spawn(move || {
                    let mut vm = VirtualMachine::new(asm).unwrap();
                    vm.execute("fact", &[Value::i32(n)]).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(
        results,
        [1, 2, 6, 24, 120].into_iter().map(|v| Some(Value::i32(v))).collect::<Vec<_>>()
    );
}

#[test]
fn test_global_initializer_names_later_global() {
    let asm = build(|b| {
        let later = Value::Global(SymbolRef::new("b", Type::ptr(Type::i32())));
        let a = b.define_global("a", Type::ptr(Type::i32()), Some(later));
        b.define_global("b", Type::i32(), Some(Value::i32(5)));
        b.define_proc("main");
        b.set_return_type(Type::i32()).unwrap();
        let target = b.load(a).unwrap();
        let v = b.load(target).unwrap();
        b.ret(Some(v)).unwrap();
    });
    let mut vm = VirtualMachine::new(&asm).unwrap();
    assert_eq!(vm.execute("main", &[]).unwrap(), Some(Value::i32(5)));
}

#[test]
fn test_shift_counts_are_masked() {
    let asm = build(|b| {
        b.define_proc("shl33");
        b.set_return_type(Type::i32()).unwrap();
        let v = b.shl(Value::i32(1), Value::i32(33)).unwrap();
        b.ret(Some(v)).unwrap();

        b.define_proc("sar40");
        b.set_return_type(Type::i32()).unwrap();
        let v = b.shr(Value::i32(-64), Value::i32(40)).unwrap();
        b.ret(Some(v)).unwrap();

        b.define_proc("shr_u32");
        b.set_return_type(Type::u32()).unwrap();
        let v = b.shr(Value::u32(0x80), Value::i32(36)).unwrap();
        b.ret(Some(v)).unwrap();

        // Narrow values shift in a 32-bit register and are truncated after
        b.define_proc("shl_i8");
        b.set_return_type(Type::i8()).unwrap();
        let v = b.shl(Value::i8(1), Value::i32(9)).unwrap();
        b.ret(Some(v)).unwrap();
    });
    let mut vm = VirtualMachine::new(&asm).unwrap();
    assert_eq!(vm.execute("shl33", &[]).unwrap(), Some(Value::i32(2)));
    assert_eq!(vm.execute("sar40", &[]).unwrap(), Some(Value::i32(-1)));
    assert_eq!(vm.execute("shr_u32", &[]).unwrap(), Some(Value::u32(0x08)));
    assert_eq!(vm.execute("shl_i8", &[]).unwrap(), Some(Value::i8(0)));
}

#[test]
fn test_element_ptr_offset_wraps() {
    let asm = build(|b| {
        let odd = b.define_struct("odd", vec![Type::i8(), Type::i16()]);
        b.define_proc("main");
        let p = b.alloc(Type::ptr(odd.clone())).unwrap();
        let bytes = b.cast(p, Type::ptr(Type::i8())).unwrap();
        let before = b.sub(bytes, Value::i32(1)).unwrap();
        let q = b.cast(before, Type::ptr(odd)).unwrap();
        let field = b.element_ptr(q, 1).unwrap();
        b.store(field, Value::int(16, true, 3)).unwrap();
        b.ret(None).unwrap();
    });
    let mut vm = VirtualMachine::new(&asm).unwrap();
    // Offset u32::MAX + 2 wraps to 1, which the arena cannot address
    assert!(vm.execute("main", &[]).unwrap_err().is_unsupported());
}

#[test]
fn test_stack_cells_die_with_their_frame() {
    let asm = build(|b| {
        let leak = b.define_proc("leak");
        b.set_return_type(Type::ptr(Type::i32())).unwrap();
        let p = b.alloc(Type::ptr(Type::i32())).unwrap();
        b.store(p.clone(), Value::i32(5)).unwrap();
        b.ret(Some(p)).unwrap();
        let leak = b.proc_value(leak).unwrap();

        b.define_proc("main");
        b.set_return_type(Type::i32()).unwrap();
        let p = b.call(leak, vec![]).unwrap();
        let v = b.load(p).unwrap();
        b.ret(Some(v)).unwrap();
    });
    let mut vm = VirtualMachine::new(&asm).unwrap();
    let err = vm.execute("main", &[]).unwrap_err();
    assert!(matches!(err, CompilerError::Runtime { .. }), "{:?}", err);
}
