use anyhow::Result;
use tacc::{
    ast::{Decl, Expr, FuncDecl, LValue, Operator, Program, Stmt},
    codegen::{liveness, FunctionInfo},
    compile,
    frame::{Aarch64, Convention, X86_64},
    symbol::{SymbolId, SymbolKind, SymbolTable, Type},
    tac::{BinOp, Global, Location, OpCode, OperandId, Tag},
    Error, Unit, AARCH64, X86_64_SYSV,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn int(symbol: SymbolId) -> Expr {
    Expr::name(symbol, Type::Int)
}

fn binary(op: Operator, lhs: Expr, rhs: Expr) -> Expr {
    let ty = match op {
        Operator::Eq | Operator::Neq | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
            Type::Bool
        }
        _ => Type::Int,
    };
    Expr::binary(op, lhs, rhs, ty)
}

fn func(symbol: SymbolId, params: Vec<SymbolId>, body: Vec<Stmt>) -> Decl {
    Decl::Func(FuncDecl {
        symbol,
        params,
        body,
    })
}

fn operand_of(unit: &Unit, symbol: SymbolId) -> OperandId {
    unit.operands
        .iter()
        .find(|(_, operand)| operand.symbol() == Some(symbol))
        .map(|(id, _)| id)
        .unwrap()
}

fn tagged(unit: &Unit, tag: Tag) -> Vec<OperandId> {
    unit.operands
        .iter()
        .filter(|(_, operand)| operand.tag() == Some(tag))
        .map(|(id, _)| id)
        .collect()
}

/// No two interfering operands share a register, and every node is resolved.
fn assert_sound(unit: &Unit, function: &FunctionInfo) {
    let graph = &function.interference;
    for &node in graph.nodes() {
        assert!(unit.operands[node].is_resolved(), "{} unresolved", node);
        let reg = unit.operands[node].register();
        for neighbor in graph.neighbors(node) {
            if reg.is_some() {
                assert_ne!(reg, unit.operands[neighbor].register(), "{} / {}", node, neighbor);
            }
        }
    }
    for bundle in graph.bundles() {
        assert!(!bundle.interferes.contains(&bundle.defined));
    }
}

/// Every instruction sits in exactly one block, blocks tile the function in order and
/// successor counts match the terminator.
fn assert_well_formed(unit: &Unit, function: &FunctionInfo) {
    let cfg = &function.cfg;
    let mut next = function.start;
    for (id, block) in cfg.blocks() {
        assert_eq!(block.start, next);
        assert!(block.start <= block.end);
        next = block.end + 1;

        let succ = cfg.graph.succ(id).count();
        match unit.instrs[block.end].op {
            OpCode::Jump => assert_eq!(succ, 1),
            OpCode::BranchIfFalse => assert!((1..=2).contains(&succ)),
            OpCode::Return => assert_eq!(succ, 0),
            _ => assert!(succ <= 1),
        }
        for s in cfg.graph.succ(id) {
            assert!(cfg.graph.pred(s).any(|p| p == id));
        }
    }
    assert_eq!(next, function.end + 1);

    for index in function.range() {
        let owners = cfg
            .blocks()
            .filter(|(_, block)| block.range().contains(&index))
            .count();
        assert_eq!(owners, 1);
    }
}

// int f(int a, int b, int c) { return a + b * c; }
fn straight_line() -> Program {
    let mut symbols = SymbolTable::new();
    let f = symbols.declare(
        "f",
        SymbolKind::Function,
        Type::function(vec![Type::Int; 3], Type::Int),
    );
    let a = symbols.declare("a", SymbolKind::Param, Type::Int);
    let b = symbols.declare("b", SymbolKind::Param, Type::Int);
    let c = symbols.declare("c", SymbolKind::Param, Type::Int);

    let body = vec![Stmt::Return(Some(binary(
        Operator::Plus,
        int(a),
        binary(Operator::Mul, int(b), int(c)),
    )))];
    Program {
        symbols,
        decls: vec![func(f, vec![a, b, c], body)],
    }
}

// int f(bool cond) { int x; if (cond) { x = 1; } else { x = 2; } return x; }
fn if_else() -> Program {
    let mut symbols = SymbolTable::new();
    let f = symbols.declare(
        "f",
        SymbolKind::Function,
        Type::function(vec![Type::Bool], Type::Int),
    );
    let cond = symbols.declare("cond", SymbolKind::Param, Type::Bool);
    let x = symbols.declare("x", SymbolKind::Local, Type::Int);

    let body = vec![
        Stmt::Local(x, None),
        Stmt::If {
            branches: vec![(
                Expr::name(cond, Type::Bool),
                vec![Stmt::Assign(LValue::Var(x), Expr::int(1))],
            )],
            els: Some(vec![Stmt::Assign(LValue::Var(x), Expr::int(2))]),
        },
        Stmt::Return(Some(int(x))),
    ];
    Program {
        symbols,
        decls: vec![func(f, vec![cond], body)],
    }
}

// int f(int n) { int i = 0; int s = 0; while (i < n) { s = s + i; i = i + 1; } return s; }
fn counting_loop() -> Program {
    let mut symbols = SymbolTable::new();
    let f = symbols.declare(
        "f",
        SymbolKind::Function,
        Type::function(vec![Type::Int], Type::Int),
    );
    let n = symbols.declare("n", SymbolKind::Param, Type::Int);
    let i = symbols.declare("i", SymbolKind::Local, Type::Int);
    let s = symbols.declare("s", SymbolKind::Local, Type::Int);

    let body = vec![
        Stmt::Local(i, Some(Expr::int(0))),
        Stmt::Local(s, Some(Expr::int(0))),
        Stmt::While(
            binary(Operator::Lt, int(i), int(n)),
            vec![
                Stmt::Assign(LValue::Var(s), binary(Operator::Plus, int(s), int(i))),
                Stmt::Assign(LValue::Var(i), binary(Operator::Plus, int(i), Expr::int(1))),
            ],
        ),
        Stmt::Return(Some(int(s))),
    ];
    Program {
        symbols,
        decls: vec![func(f, vec![n], body)],
    }
}

// int f() { int v0 = 0; ... int v15 = 15; return v0 + v1 + ... + v15; }
fn pressure(count: usize) -> Program {
    let mut symbols = SymbolTable::new();
    let f = symbols.declare("f", SymbolKind::Function, Type::function(vec![], Type::Int));
    let vars: Vec<_> = (0..count)
        .map(|i| symbols.declare(format!("v{}", i), SymbolKind::Local, Type::Int))
        .collect();

    let mut body: Vec<_> = vars
        .iter()
        .enumerate()
        .map(|(i, &var)| Stmt::Local(var, Some(Expr::int(i as i64))))
        .collect();
    let sum = vars[1..]
        .iter()
        .fold(int(vars[0]), |acc, &var| binary(Operator::Plus, acc, int(var)));
    body.push(Stmt::Return(Some(sum)));

    Program {
        symbols,
        decls: vec![func(f, vec![], body)],
    }
}

// int callee(int p0, ..., int p7) { return p0 + p7; }
// int caller() { return callee(0, ..., 7); }
fn many_arguments() -> Program {
    let mut symbols = SymbolTable::new();
    let callee = symbols.declare(
        "callee",
        SymbolKind::Function,
        Type::function(vec![Type::Int; 8], Type::Int),
    );
    let caller = symbols.declare(
        "caller",
        SymbolKind::Function,
        Type::function(vec![], Type::Int),
    );
    let params: Vec<_> = (0..8)
        .map(|i| symbols.declare(format!("p{}", i), SymbolKind::Param, Type::Int))
        .collect();

    let callee_body = vec![Stmt::Return(Some(binary(
        Operator::Plus,
        int(params[0]),
        int(params[7]),
    )))];
    let caller_body = vec![Stmt::Return(Some(Expr::call(
        callee,
        (0..8).map(Expr::int).collect(),
        Type::Int,
    )))];

    Program {
        symbols,
        decls: vec![
            func(callee, params, callee_body),
            func(caller, vec![], caller_body),
        ],
    }
}

#[test]
fn test_straight_line_arithmetic() -> Result<()> {
    init();
    let program = straight_line();
    let unit = compile(&program, X86_64_SYSV)?;
    let function = &unit.functions[0];

    let binaries: Vec<_> = unit
        .instrs
        .iter()
        .filter(|instr| matches!(instr.op, OpCode::Binary(_)))
        .collect();
    assert_eq!(binaries.len(), 2);
    assert_eq!(binaries[0].op, OpCode::Binary(BinOp::Mul));
    assert_eq!(binaries[1].op, OpCode::Binary(BinOp::Add));
    assert_eq!(binaries[1].right, binaries[0].result);

    assert!(function.spilled.is_empty());
    assert_sound(&unit, function);

    // a is still needed when b * c is computed
    let a = operand_of(&unit, program.symbols.lookup("a").unwrap());
    let product = binaries[0].result.unwrap();
    assert!(binaries[0].live_out.contains(&a));
    assert_ne!(unit.operands[product].register(), unit.operands[a].register());
    Ok(())
}

#[test]
fn test_if_else() -> Result<()> {
    init();
    let program = if_else();
    let unit = compile(&program, X86_64_SYSV)?;
    let function = &unit.functions[0];
    let cfg = &function.cfg;

    assert_eq!(cfg.len(), 4);
    let ids: Vec<_> = cfg.graph.ids().collect();
    let succ = |id| cfg.graph.succ(id).collect::<Vec<_>>();
    assert_eq!(succ(ids[0]), vec![ids[1], ids[2]]);
    assert_eq!(succ(ids[1]), vec![ids[3]]);
    assert_eq!(succ(ids[2]), vec![ids[3]]);
    assert!(succ(ids[3]).is_empty());

    let x = operand_of(&unit, program.symbols.lookup("x").unwrap());
    let definitions: Vec<_> = function.interference.bundles_of(x).collect();
    assert_eq!(definitions.len(), 2);
    assert!(definitions
        .iter()
        .all(|bundle| !bundle.interferes.contains(&x)));
    assert_ne!(definitions[0].block, definitions[1].block);

    assert_well_formed(&unit, function);
    assert_sound(&unit, function);
    Ok(())
}

#[test]
fn test_loop_carried_value() -> Result<()> {
    init();
    let program = counting_loop();
    let unit = compile(&program, X86_64_SYSV)?;
    let function = &unit.functions[0];
    let cfg = &function.cfg;

    let start = unit.instrs[function.range()]
        .iter()
        .find(|instr| instr.op == OpCode::Label)
        .map(|instr| instr.id)
        .unwrap();
    let header = cfg.block(cfg.block_of(start).unwrap());
    for name in ["i", "s", "n"] {
        let var = operand_of(&unit, program.symbols.lookup(name).unwrap());
        assert!(header.live_in.contains(&var), "{} not live into the loop", name);
    }

    let compare = unit
        .instrs
        .iter()
        .find(|instr| matches!(instr.op, OpCode::Relational(_)))
        .unwrap();
    let bundle = function
        .interference
        .bundles()
        .iter()
        .find(|bundle| bundle.instr == compare.id)
        .unwrap();
    assert!(bundle.precedes_conditional);
    assert_eq!(
        function
            .interference
            .bundles()
            .iter()
            .filter(|bundle| bundle.precedes_conditional)
            .count(),
        1
    );

    assert_well_formed(&unit, function);
    assert_sound(&unit, function);
    Ok(())
}

#[test]
fn test_fixed_point_is_stable() -> Result<()> {
    init();
    let program = counting_loop();
    let unit = compile(&program, AARCH64)?;
    let mut function = unit.functions[0].clone();

    let snapshot = |function: &FunctionInfo| {
        function
            .cfg
            .blocks()
            .map(|(_, block)| (block.live_in.clone(), block.live_out.clone()))
            .collect::<Vec<_>>()
    };
    let before = snapshot(&function);
    assert_eq!(liveness::solve(&mut function.cfg), 1);
    assert_eq!(before, snapshot(&function));
    Ok(())
}

#[test]
fn test_register_pressure() -> Result<()> {
    init();
    let program = pressure(16);

    let x86 = compile(&program, X86_64_SYSV)?;
    let function = &x86.functions[0];
    assert!(function.spilled.len() >= 16 - X86_64::registers().len());
    for &spilled in &function.spilled {
        assert_eq!(x86.operands[spilled].location(), Some(Location::Frame));
    }
    assert_sound(&x86, function);

    // the choice of victim leaves liveness untouched
    let arm = compile(&program, AARCH64)?;
    assert!(arm.functions[0].spilled.is_empty());
    assert_sound(&arm, &arm.functions[0]);
    for (a, b) in x86.instrs.iter().zip(&arm.instrs) {
        assert_eq!(a.live_out, b.live_out);
    }
    Ok(())
}

#[test]
fn test_fits_without_spill() -> Result<()> {
    init();
    let program = pressure(X86_64::registers().len() - 2);
    let unit = compile(&program, X86_64_SYSV)?;
    assert!(unit.functions[0].spilled.is_empty());
    assert_sound(&unit, &unit.functions[0]);
    Ok(())
}

fn check_calling_convention<C: Convention>(unit: &Unit) {
    let arg_regs = C::arg_regs();
    for index in 0..8 {
        for tag in [Tag::Arg(index), Tag::Param(index)] {
            let operands = tagged(unit, tag);
            assert_eq!(operands.len(), 1);
            let location = unit.operands[operands[0]].location();
            match arg_regs.get(index) {
                Some(&reg) => assert_eq!(location, Some(Location::Register(reg))),
                None => assert_eq!(location, Some(Location::Frame)),
            }
        }
    }

    for tag in [Tag::ReturnValue, Tag::CallResult] {
        for operand in tagged(unit, tag) {
            assert_eq!(unit.operands[operand].register(), Some(C::rv()));
        }
    }

    for function in &unit.functions {
        assert_sound(unit, function);
        assert_well_formed(unit, function);
    }
}

#[test]
fn test_calling_convention() -> Result<()> {
    init();
    let program = many_arguments();

    let x86 = compile(&program, X86_64_SYSV)?;
    check_calling_convention::<X86_64>(&x86);
    // the parameters themselves follow their incoming slot into the frame
    for name in ["p6", "p7"] {
        let param = operand_of(&x86, program.symbols.lookup(name).unwrap());
        assert!(x86.operands[param].is_frame_resident());
    }
    assert_eq!(tagged(&x86, Tag::ReturnValue).len(), 2);

    let call = x86
        .instrs
        .iter()
        .find(|instr| instr.op == OpCode::Call)
        .unwrap();
    assert_eq!(call.args.len(), 8);

    let arm = compile(&program, AARCH64)?;
    check_calling_convention::<Aarch64>(&arm);
    Ok(())
}

#[test]
fn test_values_live_across_calls_avoid_caller_saved() -> Result<()> {
    init();
    // int g(int v) { return v; }
    // int f(int a) { int b = a + 1; int c = g(a); return b + c; }
    let mut symbols = SymbolTable::new();
    let g = symbols.declare(
        "g",
        SymbolKind::Function,
        Type::function(vec![Type::Int], Type::Int),
    );
    let f = symbols.declare(
        "f",
        SymbolKind::Function,
        Type::function(vec![Type::Int], Type::Int),
    );
    let v = symbols.declare("v", SymbolKind::Param, Type::Int);
    let a = symbols.declare("a", SymbolKind::Param, Type::Int);
    let b = symbols.declare("b", SymbolKind::Local, Type::Int);
    let c = symbols.declare("c", SymbolKind::Local, Type::Int);

    let program = Program {
        symbols,
        decls: vec![
            func(g, vec![v], vec![Stmt::Return(Some(int(v)))]),
            func(
                f,
                vec![a],
                vec![
                    Stmt::Local(b, Some(binary(Operator::Plus, int(a), Expr::int(1)))),
                    Stmt::Local(c, Some(Expr::call(g, vec![int(a)], Type::Int))),
                    Stmt::Return(Some(binary(Operator::Plus, int(b), int(c)))),
                ],
            ),
        ],
    };

    let unit = compile(&program, X86_64_SYSV)?;
    let b = operand_of(&unit, b);
    let reg = unit.operands[b].register().unwrap();
    assert!(!X86_64::caller_save_regs().contains(&reg), "b in {}", reg);
    assert_eq!(unit.operands[b].restricted(), X86_64::caller_save_regs());
    for function in &unit.functions {
        assert_sound(&unit, function);
    }
    Ok(())
}

#[test]
fn test_control_flow_shapes() -> Result<()> {
    init();
    // void f(int n) {
    //     for (int i = 0; i < n; i = i + 1) {
    //         if (i == 3) { continue; } else if (i == 5) { break; }
    //         n = n - 1;
    //     }
    // }
    let mut symbols = SymbolTable::new();
    let f = symbols.declare(
        "f",
        SymbolKind::Function,
        Type::function(vec![Type::Int], Type::Void),
    );
    let n = symbols.declare("n", SymbolKind::Param, Type::Int);
    let i = symbols.declare("i", SymbolKind::Local, Type::Int);

    let body = vec![Stmt::For {
        init: Some(Box::new(Stmt::Local(i, Some(Expr::int(0))))),
        cond: Some(binary(Operator::Lt, int(i), int(n))),
        update: Some(Box::new(Stmt::Assign(
            LValue::Var(i),
            binary(Operator::Plus, int(i), Expr::int(1)),
        ))),
        body: vec![
            Stmt::If {
                branches: vec![
                    (
                        binary(Operator::Eq, int(i), Expr::int(3)),
                        vec![Stmt::Continue],
                    ),
                    (
                        binary(Operator::Eq, int(i), Expr::int(5)),
                        vec![Stmt::Break],
                    ),
                ],
                els: None,
            },
            Stmt::Assign(LValue::Var(n), binary(Operator::Minus, int(n), Expr::int(1))),
        ],
    }];
    let program = Program {
        symbols,
        decls: vec![func(f, vec![n], body)],
    };

    let unit = compile(&program, X86_64_SYSV)?;
    let function = &unit.functions[0];
    assert_well_formed(&unit, function);
    assert_sound(&unit, function);
    assert_eq!(
        unit.instrs.last().map(|instr| instr.op),
        Some(OpCode::Return)
    );

    // the loop's back edge goes to the block holding the start label
    let cfg = &function.cfg;
    let back_edge = unit.instrs[function.range()]
        .iter()
        .filter(|instr| instr.op == OpCode::Jump)
        .last()
        .unwrap();
    let start = unit.instrs[function.range()]
        .iter()
        .find(|instr| instr.op == OpCode::Label)
        .unwrap();
    let from = cfg.block_of(back_edge.id).unwrap();
    assert_eq!(
        cfg.graph.succ(from).collect::<Vec<_>>(),
        vec![cfg.block_of(start.id).unwrap()]
    );
    Ok(())
}

#[test]
fn test_uninitialized_locals_stay_apart() -> Result<()> {
    init();
    // int f() { int u; int v; return u + v; }
    let mut symbols = SymbolTable::new();
    let f = symbols.declare("f", SymbolKind::Function, Type::function(vec![], Type::Int));
    let u = symbols.declare("u", SymbolKind::Local, Type::Int);
    let v = symbols.declare("v", SymbolKind::Local, Type::Int);

    let body = vec![
        Stmt::Local(u, None),
        Stmt::Local(v, None),
        Stmt::Return(Some(binary(Operator::Plus, int(u), int(v)))),
    ];
    let program = Program {
        symbols,
        decls: vec![func(f, vec![], body)],
    };

    for unit in [compile(&program, X86_64_SYSV)?, compile(&program, AARCH64)?] {
        let function = &unit.functions[0];
        let (u, v) = (operand_of(&unit, u), operand_of(&unit, v));

        // neither is ever defined, both arrive live
        assert!(function.interference.bundles_of(u).next().is_none());
        assert!(function.interference.bundles_of(v).next().is_none());
        assert!(function.interference.interferes(u, v));
        assert!(function.interference.interferes(v, u));

        assert!(function.spilled.is_empty());
        let (ru, rv) = (unit.operands[u].register(), unit.operands[v].register());
        assert!(ru.is_some() && rv.is_some());
        assert_ne!(ru, rv);
        assert_sound(&unit, function);
    }
    Ok(())
}

#[test]
fn test_code_after_return() -> Result<()> {
    init();
    // int f() { int x; return 1; x = 2; return x; }
    let mut symbols = SymbolTable::new();
    let f = symbols.declare("f", SymbolKind::Function, Type::function(vec![], Type::Int));
    let x = symbols.declare("x", SymbolKind::Local, Type::Int);

    let body = vec![
        Stmt::Local(x, None),
        Stmt::Return(Some(Expr::int(1))),
        Stmt::Assign(LValue::Var(x), Expr::int(2)),
        Stmt::Return(Some(int(x))),
    ];
    let program = Program {
        symbols,
        decls: vec![func(f, vec![], body)],
    };

    let unit = compile(&program, X86_64_SYSV)?;
    let function = &unit.functions[0];
    assert_well_formed(&unit, function);
    assert_sound(&unit, function);

    let cfg = &function.cfg;
    let ranges: Vec<_> = cfg.blocks().map(|(_, block)| block.range()).collect();
    assert_eq!(ranges, vec![0..=2, 3..=5]);
    let ids: Vec<_> = cfg.graph.ids().collect();
    assert_eq!(cfg.graph.succ(ids[0]).count(), 0);
    assert_eq!(cfg.graph.pred(ids[1]).count(), 0);
    Ok(())
}

#[test]
fn test_arrays_and_globals() -> Result<()> {
    init();
    // int counter = 5;
    // int f(int i) { int arr[4]; arr[i] = counter; return arr[i]; }
    let mut symbols = SymbolTable::new();
    let counter = symbols.declare("counter", SymbolKind::Global, Type::Int);
    let f = symbols.declare(
        "f",
        SymbolKind::Function,
        Type::function(vec![Type::Int], Type::Int),
    );
    let i = symbols.declare("i", SymbolKind::Param, Type::Int);
    let arr = symbols.declare_at("arr", SymbolKind::Local, Type::array(Type::Int, 4), -32);

    let program = Program {
        symbols,
        decls: vec![
            Decl::Global {
                symbol: counter,
                init: Some(Expr::int(5)),
            },
            func(
                f,
                vec![i],
                vec![
                    Stmt::Local(arr, None),
                    Stmt::Assign(LValue::Index(arr, Box::new(int(i))), int(counter)),
                    Stmt::Return(Some(Expr::index(arr, int(i), Type::Int))),
                ],
            ),
        ],
    };

    let unit = compile(&program, AARCH64)?;
    assert_eq!(
        unit.globals,
        vec![Global {
            symbol: counter,
            init: 5
        }]
    );

    let ops: Vec<_> = unit.instrs.iter().map(|instr| instr.op).collect();
    assert!(ops.contains(&OpCode::Store));
    assert!(ops.contains(&OpCode::Deref));

    let function = unit.function(f).unwrap();
    for symbol in [arr, counter] {
        let operand = operand_of(&unit, symbol);
        assert!(!function.interference.nodes().contains(&operand));
        assert_eq!(unit.operands[operand].location(), None);
    }
    assert_sound(&unit, function);
    Ok(())
}

#[test]
fn test_deterministic() -> Result<()> {
    init();
    for program in [pressure(16), counting_loop(), many_arguments()] {
        let first = compile(&program, X86_64_SYSV)?;
        let second = compile(&program, X86_64_SYSV)?;
        let locations = |unit: &Unit| {
            unit.operands
                .iter()
                .map(|(_, operand)| operand.location())
                .collect::<Vec<_>>()
        };
        assert_eq!(locations(&first), locations(&second));
        assert_eq!(
            first.listing(&program.symbols).to_string(),
            second.listing(&program.symbols).to_string()
        );
    }
    Ok(())
}

#[test]
fn test_listing() -> Result<()> {
    init();
    let program = straight_line();
    let unit = compile(&program, X86_64_SYSV)?;
    let listing = unit.listing(&program.symbols).to_string();

    assert!(listing.starts_with("   0  func f:"));
    assert!(listing.contains("<rax>"));
    assert!(listing.contains("<rdi>"));
    assert!(listing.contains("; live:"));
    Ok(())
}

#[test]
fn test_errors() {
    init();
    let mut symbols = SymbolTable::new();
    let f = symbols.declare("f", SymbolKind::Function, Type::function(vec![], Type::Void));
    let program = Program {
        symbols,
        decls: vec![func(f, vec![], vec![Stmt::Continue])],
    };

    let err = compile(&program, X86_64_SYSV).unwrap_err();
    assert!(matches!(err, Error::LowerError(_)));
    assert_eq!(err.to_string(), "`continue` outside of a loop");
}
