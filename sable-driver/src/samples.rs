//! Built-in sample programs
//!
//! Each sample is written against the `Builder` the way a front-end would
//! drive it, and every one of them runs on the virtual machine and lowers
//! to x86.

use sable_common::Result;
use sable_ir::{Builder, HighLevelBuilderExt, Type, UncheckedAssembly, Value};

#[derive(Debug)]
pub struct Sample {
    pub name: &'static str,
    pub description: &'static str,
    /// Procedure `run` calls
    pub entry: &'static str,
    /// Number of i32 arguments the entry takes
    pub arity: usize,
    pub build: fn() -> Result<UncheckedAssembly>,
}

pub static SAMPLES: &[Sample] = &[
    Sample {
        name: "const263",
        description: "return a constant",
        entry: "entry",
        arity: 0,
        build: const263,
    },
    Sample {
        name: "factorial",
        description: "recursive factorial",
        entry: "fact",
        arity: 1,
        build: factorial,
    },
    Sample {
        name: "factorial_iter",
        description: "factorial over stack cells and explicit loop blocks",
        entry: "fact_iter",
        arity: 1,
        build: factorial_iter,
    },
    Sample {
        name: "sum_while",
        description: "sum of 1..=n with a while loop",
        entry: "sum",
        arity: 1,
        build: sum_while,
    },
    Sample {
        name: "abs",
        description: "absolute value with if/else",
        entry: "abs",
        arity: 1,
        build: abs,
    },
    Sample {
        name: "point",
        description: "store and reload the first field of a struct",
        entry: "point_x",
        arity: 1,
        build: point,
    },
];

pub fn find(name: &str) -> Option<&'static Sample> {
    SAMPLES.iter().find(|s| s.name == name)
}

fn const263() -> Result<UncheckedAssembly> {
    let mut b = Builder::new("const263");
    b.define_proc("entry");
    b.set_return_type(Type::i32())?;
    b.ret(Some(Value::i32(263)))?;
    Ok(b.finish())
}

/// fact(n) = n <= 1 ? 1 : n * fact(n - 1)
fn factorial() -> Result<UncheckedAssembly> {
    let mut b = Builder::new("factorial");
    let fact = b.define_proc("fact");
    b.set_return_type(Type::i32())?;
    let n = b.define_parameter(Type::i32())?;
    let callee = b.proc_value(fact)?;

    let nc = n.clone();
    b.if_then(|b| b.cmp_le_eq(nc, Value::i32(1)), |b| b.ret(Some(Value::i32(1))))?;
    let m = b.sub(n.clone(), Value::i32(1))?;
    let r = b.call(callee, vec![m])?;
    let product = b.mul(n, r)?;
    b.ret(Some(product))?;
    Ok(b.finish())
}

fn factorial_iter() -> Result<UncheckedAssembly> {
    let mut b = Builder::new("factorial_iter");
    b.define_proc("fact_iter");
    b.set_return_type(Type::i32())?;
    let n = b.define_parameter(Type::i32())?;

    let acc = b.alloc(Type::ptr(Type::i32()))?;
    let i = b.alloc(Type::ptr(Type::i32()))?;
    b.store(acc.clone(), Value::i32(1))?;
    b.store(i.clone(), n)?;

    let condition = b.append_basic_block("loop_condition")?;
    let body = b.append_basic_block("loop")?;
    let end = b.append_basic_block("end_loop")?;
    b.jmp(condition)?;

    b.position_at_end(condition)?;
    let iv = b.load(i.clone())?;
    let more = b.cmp_gr(iv, Value::i32(1))?;
    b.jmp_if(more, body, end)?;

    b.position_at_end(body)?;
    let a = b.load(acc.clone())?;
    let iv = b.load(i.clone())?;
    let product = b.mul(a, iv.clone())?;
    b.store(acc.clone(), product)?;
    let next = b.sub(iv, Value::i32(1))?;
    b.store(i, next)?;
    b.jmp(condition)?;

    b.position_at_end(end)?;
    let result = b.load(acc)?;
    b.ret(Some(result))?;
    Ok(b.finish())
}

fn sum_while() -> Result<UncheckedAssembly> {
    let mut b = Builder::new("sum_while");
    b.define_proc("sum");
    b.set_return_type(Type::i32())?;
    let n = b.define_parameter(Type::i32())?;

    let acc = b.alloc(Type::ptr(Type::i32()))?;
    let i = b.alloc(Type::ptr(Type::i32()))?;
    b.store(acc.clone(), Value::i32(0))?;
    b.store(i.clone(), Value::i32(1))?;

    let (ic, ib, accb) = (i.clone(), i.clone(), acc.clone());
    b.while_loop(
        |b| {
            let iv = b.load(ic)?;
            b.cmp_le_eq(iv, n)
        },
        |b| {
            let iv = b.load(ib.clone())?;
            let a = b.load(accb.clone())?;
            let sum = b.add(a, iv.clone())?;
            b.store(accb, sum)?;
            let next = b.add(iv, Value::i32(1))?;
            b.store(ib, next)
        },
    )?;

    let result = b.load(acc)?;
    b.ret(Some(result))?;
    Ok(b.finish())
}

fn abs() -> Result<UncheckedAssembly> {
    let mut b = Builder::new("abs");
    b.define_proc("abs");
    b.set_return_type(Type::i32())?;
    let x = b.define_parameter(Type::i32())?;

    let (xc, xn) = (x.clone(), x.clone());
    b.if_then_else(
        |b| b.cmp_le(xc, Value::i32(0)),
        |b| {
            let negated = b.sub(Value::i32(0), xn)?;
            b.ret(Some(negated))
        },
        |b| b.ret(Some(x)),
    )?;
    Ok(b.finish())
}

fn point() -> Result<UncheckedAssembly> {
    let mut b = Builder::new("point");
    let point = b.define_struct("point", vec![Type::i32(), Type::i32()]);
    b.define_proc("point_x");
    b.set_return_type(Type::i32())?;
    let x = b.define_parameter(Type::i32())?;

    let p = b.alloc(Type::ptr(point))?;
    let field = b.element_ptr(p, 0)?;
    b.store(field.clone(), x)?;
    let v = b.load(field)?;
    b.ret(Some(v))?;
    Ok(b.finish())
}
