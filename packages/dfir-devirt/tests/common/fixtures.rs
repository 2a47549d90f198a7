//! Program IR scenarios
//!
//! Every scenario is a small module built with `IrModuleBuilder`; the ids a
//! test needs to inspect afterwards are returned next to the module.

use dfir_devirt::features::program_ir::{
    ClassId, ClassKind, ExprId, IrFunctionId, IrModule, IrModuleBuilder, IrType, Modality, Origin,
};
use dfir_devirt::{DevirtConfig, DfgSerializer, LibraryBlob, ModuleDfgBuilder, OutputKind, SymbolArena};

/// A module with one interesting virtual call site
pub struct Scenario {
    pub ir: IrModule,
    pub site: ExprId,
    /// Function containing `site`
    pub caller: IrFunctionId,
    /// Implementations the site may reach, in declaration order
    pub implementations: Vec<IrFunctionId>,
}

/// `abstract class Shape { abstract fun area() }` plus final subclasses
///
/// `main` assigns an instance of every subclass to `s: Shape` and then calls
/// `s.area()`.
pub fn shapes_program(subclasses: &[&str]) -> Scenario {
    let mut b = IrModuleBuilder::new("app");
    let unit = b.unit_type();
    let shape = b.class("app.Shape", ClassKind::Class, Modality::Abstract);
    let area = b.method(shape, "area", Modality::Abstract, &[], unit.clone());

    let mut implementations = Vec::new();
    let mut constructors = Vec::new();
    for name in subclasses {
        let class = b.class(format!("app.{name}"), ClassKind::Class, Modality::Final);
        b.extends(class, &[shape]);
        let implementation = b.override_method(class, area, Modality::Final);
        let body = b.block(Vec::new(), unit.clone());
        b.set_body(implementation, body);
        implementations.push(implementation);
        constructors.push(empty_constructor(&mut b, class));
    }

    let main = b.function("main", &[], unit.clone());
    let s = b.variable("s", IrType::class(shape));
    let mut statements = vec![b.declare(s, None)];
    for constructor in constructors {
        let created = b.new_object(constructor, Vec::new());
        statements.push(b.set(s, created));
    }
    let read = b.get(s);
    let site = b.call(area, Some(read), Vec::new());
    statements.push(site);
    let body = b.block(statements, unit);
    b.set_body(main, body);
    b.set_entry_point(main);

    Scenario {
        ir: b.build(),
        site,
        caller: main,
        implementations,
    }
}

/// Exported `run(p: P)` calling `s.area()` through `val s: Shape = p`
///
/// `P` is the final `Circle` when `final_parameter` is set, otherwise the open
/// `Shape` itself. `Circle` is created nowhere in the module.
pub fn library_entry(final_parameter: bool) -> Scenario {
    let mut b = IrModuleBuilder::new("app");
    let unit = b.unit_type();
    let shape = b.class("app.Shape", ClassKind::Class, Modality::Open);
    let area = b.method(shape, "area", Modality::Open, &[], unit.clone());
    let base_body = b.block(Vec::new(), unit.clone());
    b.set_body(area, base_body);
    let circle = b.class("app.Circle", ClassKind::Class, Modality::Final);
    b.extends(circle, &[shape]);
    let circle_area = b.override_method(circle, area, Modality::Final);
    let circle_body = b.block(Vec::new(), unit.clone());
    b.set_body(circle_area, circle_body);
    empty_constructor(&mut b, circle);

    let parameter_type = if final_parameter { circle } else { shape };
    let run = b.function("run", &[("p", IrType::class(parameter_type))], unit.clone());
    let parameter = b.param(run, 0);
    let s = b.variable("s", IrType::class(shape));
    let read_parameter = b.get(parameter);
    let declare = b.declare(s, Some(read_parameter));
    let read = b.get(s);
    let site = b.call(area, Some(read), Vec::new());
    let body = b.block(vec![declare, site], unit);
    b.set_body(run, body);

    Scenario {
        ir: b.build(),
        site,
        caller: run,
        implementations: vec![area, circle_area],
    }
}

/// `Circle` reaches `s.area()` only through an unchecked generic cast
///
/// `fun <T> id(x: Any): T = x as T` followed by
/// `val s: Shape = id(Circle()); s.area()`.
pub fn generic_cast_program() -> Scenario {
    let mut b = IrModuleBuilder::new("app");
    let unit = b.unit_type();
    let (shape, area, circle_area, circle_init) = shape_and_circle(&mut b);

    let any = b.any_type();
    let t = IrType::type_parameter("T", Vec::new());
    let id = b.function("id", &[("x", any)], t.clone());
    let x = b.param(id, 0);
    let read_x = b.get(x);
    let cast = b.cast(read_x, t);
    let ret = b.ret(cast);
    b.set_body(id, ret);

    let main = b.function("main", &[], unit.clone());
    let created = b.new_object(circle_init, Vec::new());
    let passed = b.call(id, None, vec![created]);
    let s = b.variable("s", IrType::class(shape));
    let declare = b.declare(s, Some(passed));
    let read = b.get(s);
    let site = b.call(area, Some(read), Vec::new());
    let body = b.block(vec![declare, site], unit);
    b.set_body(main, body);
    b.set_entry_point(main);

    Scenario {
        ir: b.build(),
        site,
        caller: main,
        implementations: vec![circle_area],
    }
}

/// `Circle` reaches `s.area()` through a cast to an opaque class and back
pub fn opaque_cast_program() -> Scenario {
    let mut b = IrModuleBuilder::new("app");
    let unit = b.unit_type();
    let (shape, area, circle_area, circle_init) = shape_and_circle(&mut b);
    let foreign = b.class("app.Foreign", ClassKind::Class, Modality::Open);
    b.set_opaque(foreign);

    let main = b.function("main", &[], unit.clone());
    let created = b.new_object(circle_init, Vec::new());
    let hidden = b.cast(created, IrType::class(foreign));
    let any = b.any_type();
    let o = b.variable("o", any);
    let declare_o = b.declare(o, Some(hidden));
    let read_o = b.get(o);
    let back = b.cast(read_o, IrType::class(shape));
    let s = b.variable("s", IrType::class(shape));
    let declare_s = b.declare(s, Some(back));
    let read = b.get(s);
    let site = b.call(area, Some(read), Vec::new());
    let body = b.block(vec![declare_o, declare_s, site], unit);
    b.set_body(main, body);
    b.set_entry_point(main);

    Scenario {
        ir: b.build(),
        site,
        caller: main,
        implementations: vec![circle_area],
    }
}

/// Abstract `app.Shape.area` and its final `app.Circle` override with a constructor
fn shape_and_circle(b: &mut IrModuleBuilder) -> (ClassId, IrFunctionId, IrFunctionId, IrFunctionId) {
    let unit = b.unit_type();
    let shape = b.class("app.Shape", ClassKind::Class, Modality::Abstract);
    let area = b.method(shape, "area", Modality::Abstract, &[], unit.clone());
    let circle = b.class("app.Circle", ClassKind::Class, Modality::Final);
    b.extends(circle, &[shape]);
    let circle_area = b.override_method(circle, area, Modality::Final);
    let body = b.block(Vec::new(), unit);
    b.set_body(circle_area, body);
    let circle_init = empty_constructor(b, circle);
    (shape, area, circle_area, circle_init)
}

/// Library `lib` exporting open `lib.Shape` and `make(): Shape`
pub struct ShapeLibrary {
    pub blob: LibraryBlob,
}

pub fn shape_library() -> ShapeLibrary {
    let mut b = IrModuleBuilder::new("lib");
    let unit = b.unit_type();
    let shape = b.class("lib.Shape", ClassKind::Class, Modality::Open);
    let area = b.method(shape, "area", Modality::Open, &[], unit.clone());
    let area_body = b.block(Vec::new(), unit.clone());
    b.set_body(area, area_body);
    let constructor = empty_constructor(&mut b, shape);
    let make = b.function("make", &[], IrType::class(shape));
    let created = b.new_object(constructor, Vec::new());
    let ret = b.ret(created);
    b.set_body(make, ret);
    let module = b.build();

    let mut arena = SymbolArena::new();
    let config = DevirtConfig::default().output_kind(OutputKind::Library);
    let dfg = ModuleDfgBuilder::build(&module, &mut arena, &config).expect("library DFIR");
    let bytes = DfgSerializer::serialize(&dfg, &arena).expect("library blob");
    ShapeLibrary {
        blob: LibraryBlob::new("lib", bytes),
    }
}

/// Program using `lib`: `make().area()` and `Square().area()`
pub struct CrossModule {
    pub ir: IrModule,
    pub library_site: ExprId,
    pub local_site: ExprId,
    pub square_area: IrFunctionId,
    pub main: IrFunctionId,
}

pub fn cross_module_program() -> CrossModule {
    let mut b = IrModuleBuilder::new("app");
    let unit = b.unit_type();

    let shape = b.class("lib.Shape", ClassKind::Class, Modality::Open);
    b.set_origin(shape, Origin::Library("lib".into()));
    let area = b.method(shape, "area", Modality::Open, &[], unit.clone());
    let make = b.function("make", &[], IrType::class(shape));
    b.set_function_origin(make, Origin::Library("lib".into()));

    let square = b.class("app.Square", ClassKind::Class, Modality::Final);
    b.extends(square, &[shape]);
    let square_area = b.override_method(square, area, Modality::Final);
    let square_body = b.block(Vec::new(), unit.clone());
    b.set_body(square_area, square_body);
    let square_init = empty_constructor(&mut b, square);

    let main = b.function("main", &[], unit.clone());
    let a = b.variable("a", IrType::class(shape));
    let made = b.call(make, None, Vec::new());
    let declare_a = b.declare(a, Some(made));
    let read_a = b.get(a);
    let library_site = b.call(area, Some(read_a), Vec::new());

    let q = b.variable("q", IrType::class(shape));
    let created = b.new_object(square_init, Vec::new());
    let declare_q = b.declare(q, Some(created));
    let read_q = b.get(q);
    let local_site = b.call(area, Some(read_q), Vec::new());

    let body = b.block(vec![declare_a, library_site, declare_q, local_site], unit);
    b.set_body(main, body);
    b.set_entry_point(main);

    CrossModule {
        ir: b.build(),
        library_site,
        local_site,
        square_area,
        main,
    }
}

/// Chain of `depth` final classes each calling the next through an interface
///
/// Used by the benchmarks to grow the constraint graph linearly.
pub fn interface_chain(depth: usize) -> IrModule {
    let mut b = IrModuleBuilder::new("chain");
    let unit = b.unit_type();
    let step = b.class("chain.Step", ClassKind::Interface, Modality::Abstract);
    let next = b.method(step, "next", Modality::Abstract, &[], unit.clone());

    let main = b.function("main", &[], unit.clone());
    let mut statements = Vec::new();
    for i in 0..depth {
        let class = b.class(format!("chain.Step{i}"), ClassKind::Class, Modality::Final);
        b.extends(class, &[step]);
        let implementation = b.override_method(class, next, Modality::Final);
        let body = b.block(Vec::new(), unit.clone());
        b.set_body(implementation, body);
        let constructor = empty_constructor(&mut b, class);

        let v = b.variable(format!("v{i}"), IrType::class(step));
        let created = b.new_object(constructor, Vec::new());
        statements.push(b.declare(v, Some(created)));
        let read = b.get(v);
        statements.push(b.call(next, Some(read), Vec::new()));
    }
    let body = b.block(statements, unit);
    b.set_body(main, body);
    b.set_entry_point(main);
    b.build()
}

fn empty_constructor(b: &mut IrModuleBuilder, class: ClassId) -> IrFunctionId {
    let constructor = b.constructor(class, &[]);
    let body = b.block(Vec::new(), b.unit_type());
    b.set_body(constructor, body);
    constructor
}
