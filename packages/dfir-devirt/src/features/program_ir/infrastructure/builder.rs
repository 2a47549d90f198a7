//! Fluent construction of program IR modules
//!
//! ```rust,ignore
//! let mut b = IrModuleBuilder::new("app");
//! let base = b.class("app.Base", ClassKind::Class, Modality::Abstract);
//! let f = b.method(base, "f", Modality::Abstract, &[], b.unit_type());
//! ```

use crate::features::program_ir::domain::*;
use rustc_hash::FxHashMap;

pub struct IrModuleBuilder {
    module: IrModule,
}

impl IrModuleBuilder {
    /// New module with `Any`, `Unit`, `Nothing` and `Throwable` declared
    pub fn new(name: impl Into<String>) -> Self {
        let placeholder = Builtins {
            any: ClassId(0),
            unit: ClassId(0),
            nothing: ClassId(0),
            throwable: None,
            array_get: None,
            array_set: None,
            box_classes: FxHashMap::default(),
        };
        let mut builder = Self {
            module: IrModule {
                name: name.into(),
                classes: Vec::new(),
                functions: Vec::new(),
                fields: Vec::new(),
                values: Vec::new(),
                expressions: Vec::new(),
                builtins: placeholder,
                entry_point: None,
            },
        };

        let any = builder.class("core.Any", ClassKind::Class, Modality::Open);
        builder.constructor(any, &[]);
        builder.module.builtins.any = any;

        let unit = builder.object("core.Unit");
        builder.module.builtins.unit = unit;

        let nothing = builder.class("core.Nothing", ClassKind::Class, Modality::Final);
        builder.module.classes[nothing.index()].super_types.clear();
        builder.module.builtins.nothing = nothing;

        let throwable = builder.class("core.Throwable", ClassKind::Class, Modality::Open);
        builder.constructor(throwable, &[]);
        builder.module.builtins.throwable = Some(throwable);

        builder
    }

    pub fn builtins(&self) -> &Builtins {
        &self.module.builtins
    }

    pub fn module(&self) -> &IrModule {
        &self.module
    }

    pub fn build(self) -> IrModule {
        self.module
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Types
    // ═══════════════════════════════════════════════════════════════════════

    pub fn unit_type(&self) -> IrType {
        IrType::class(self.module.builtins.unit)
    }

    pub fn nothing_type(&self) -> IrType {
        IrType::class(self.module.builtins.nothing)
    }

    pub fn any_type(&self) -> IrType {
        IrType::class(self.module.builtins.any)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Declarations
    // ═══════════════════════════════════════════════════════════════════════

    /// Public local class extending `Any` (interfaces extend nothing)
    pub fn class(&mut self, name: impl Into<String>, kind: ClassKind, modality: Modality) -> ClassId {
        let super_types = if kind == ClassKind::Interface || self.module.classes.is_empty() {
            Vec::new()
        } else {
            vec![self.module.builtins.any]
        };
        self.add_class(IrClass {
            name: name.into(),
            kind,
            modality,
            visibility: Visibility::Public,
            origin: Origin::Local,
            super_types,
            methods: Vec::new(),
            constructors: Vec::new(),
            fields: Vec::new(),
            inline_adapters: None,
            is_opaque: false,
        })
    }

    /// Singleton object with an empty constructor
    pub fn object(&mut self, name: impl Into<String>) -> ClassId {
        let class = self.class(name, ClassKind::Object, Modality::Final);
        let constructor = self.constructor(class, &[]);
        let body = self.block(Vec::new(), self.unit_type());
        self.set_body(constructor, body);
        class
    }

    pub fn add_class(&mut self, class: IrClass) -> ClassId {
        let id = ClassId(self.module.classes.len() as u32);
        self.module.classes.push(class);
        id
    }

    /// Replace the super types of `class`
    pub fn extends(&mut self, class: ClassId, super_types: &[ClassId]) {
        self.module.classes[class.index()].super_types = super_types.to_vec();
    }

    pub fn set_visibility(&mut self, class: ClassId, visibility: Visibility) {
        self.module.classes[class.index()].visibility = visibility;
    }

    pub fn set_origin(&mut self, class: ClassId, origin: Origin) {
        self.module.classes[class.index()].origin = origin;
    }

    pub fn set_opaque(&mut self, class: ClassId) {
        self.module.classes[class.index()].is_opaque = true;
    }

    pub fn set_inline_adapters(&mut self, class: ClassId, adapters: InlineAdapters) {
        self.module.classes[class.index()].inline_adapters = Some(adapters);
    }

    /// Box class for nullable values of `kind`
    pub fn box_class(&mut self, kind: PrimitiveKind) -> ClassId {
        let name = format!("{}Box", kind.qualified_name());
        let class = self.class(name, ClassKind::Class, Modality::Final);
        self.module.builtins.box_classes.insert(kind, class);
        class
    }

    /// Declare `core.Array` with `get`/`set` intrinsics
    pub fn array_intrinsics(&mut self) -> ClassId {
        let array = self.class("core.Array", ClassKind::Class, Modality::Final);
        let index = ("index", IrType::primitive(PrimitiveKind::Int));
        let element = IrType::nullable_class(self.module.builtins.any);
        let get = self.method(array, "get", Modality::Final, &[index.clone()], element.clone());
        let unit = self.unit_type();
        let set = self.method(array, "set", Modality::Final, &[index, ("value", element)], unit);
        self.module.builtins.array_get = Some(get);
        self.module.builtins.array_set = Some(set);
        array
    }

    pub fn value(&mut self, name: impl Into<String>, ty: IrType, kind: ValueKind) -> ValueId {
        let id = ValueId(self.module.values.len() as u32);
        self.module.values.push(IrValue {
            name: name.into(),
            ty,
            kind,
        });
        id
    }

    pub fn variable(&mut self, name: impl Into<String>, ty: IrType) -> ValueId {
        self.value(name, ty, ValueKind::Variable { mutable: true })
    }

    pub fn catch_parameter(&mut self, name: impl Into<String>, ty: IrType) -> ValueId {
        self.value(name, ty, ValueKind::CatchParameter)
    }

    fn add_function(&mut self, function: IrFunction) -> IrFunctionId {
        let id = IrFunctionId(self.module.functions.len() as u32);
        if let Some(parent) = function.parent {
            let class = &mut self.module.classes[parent.index()];
            match function.kind {
                FunctionKind::Constructor => class.constructors.push(id),
                FunctionKind::Function => class.methods.push(id),
            }
        }
        self.module.functions.push(function);
        id
    }

    fn parameters(&mut self, params: &[(&str, IrType)]) -> Vec<ValueId> {
        params
            .iter()
            .map(|(name, ty)| self.value(*name, ty.clone(), ValueKind::Parameter))
            .collect()
    }

    /// Member function with a `this` receiver
    pub fn method(
        &mut self,
        class: ClassId,
        name: &str,
        modality: Modality,
        params: &[(&str, IrType)],
        return_type: IrType,
    ) -> IrFunctionId {
        let this = self.value("<this>", IrType::class(class), ValueKind::Parameter);
        let value_parameters = self.parameters(params);
        let origin = self.module.class(class).origin.clone();
        self.add_function(IrFunction {
            name: name.to_string(),
            signature: signature(name, params.len()),
            kind: FunctionKind::Function,
            parent: Some(class),
            modality,
            visibility: Visibility::Public,
            origin,
            overridden: Vec::new(),
            dispatch_receiver: Some(this),
            extension_receiver: None,
            value_parameters,
            return_type,
            body: None,
        })
    }

    /// Override `overridden` in `class` with a method of the same signature
    pub fn override_method(
        &mut self,
        class: ClassId,
        overridden: IrFunctionId,
        modality: Modality,
    ) -> IrFunctionId {
        let base = self.module.function(overridden).clone();
        let params: Vec<(String, IrType)> = base
            .value_parameters
            .iter()
            .map(|&p| {
                let value = self.module.value(p);
                (value.name.clone(), value.ty.clone())
            })
            .collect();
        let params: Vec<(&str, IrType)> = params.iter().map(|(n, t)| (n.as_str(), t.clone())).collect();
        let id = self.method(class, &base.name, modality, &params, base.return_type.clone());
        self.module.functions[id.index()].overridden.push(overridden);
        id
    }

    pub fn constructor(&mut self, class: ClassId, params: &[(&str, IrType)]) -> IrFunctionId {
        let this = self.value("<this>", IrType::class(class), ValueKind::Parameter);
        let value_parameters = self.parameters(params);
        let origin = self.module.class(class).origin.clone();
        let name = "<init>";
        self.add_function(IrFunction {
            name: name.to_string(),
            signature: signature(name, params.len()),
            kind: FunctionKind::Constructor,
            parent: Some(class),
            modality: Modality::Final,
            visibility: Visibility::Public,
            origin,
            overridden: Vec::new(),
            dispatch_receiver: Some(this),
            extension_receiver: None,
            value_parameters,
            return_type: IrType::class(class),
            body: None,
        })
    }

    /// Top-level function
    pub fn function(&mut self, name: &str, params: &[(&str, IrType)], return_type: IrType) -> IrFunctionId {
        let value_parameters = self.parameters(params);
        self.add_function(IrFunction {
            name: name.to_string(),
            signature: signature(name, params.len()),
            kind: FunctionKind::Function,
            parent: None,
            modality: Modality::Final,
            visibility: Visibility::Public,
            origin: Origin::Local,
            overridden: Vec::new(),
            dispatch_receiver: None,
            extension_receiver: None,
            value_parameters,
            return_type,
            body: None,
        })
    }

    pub fn set_function_visibility(&mut self, function: IrFunctionId, visibility: Visibility) {
        self.module.functions[function.index()].visibility = visibility;
    }

    pub fn set_function_origin(&mut self, function: IrFunctionId, origin: Origin) {
        self.module.functions[function.index()].origin = origin;
    }

    pub fn set_body(&mut self, function: IrFunctionId, body: ExprId) {
        self.module.functions[function.index()].body = Some(body);
    }

    pub fn set_entry_point(&mut self, function: IrFunctionId) {
        self.module.entry_point = Some(function);
    }

    /// `this` of a method or constructor
    pub fn this_of(&self, function: IrFunctionId) -> Option<ValueId> {
        self.module.function(function).dispatch_receiver
    }

    pub fn param(&self, function: IrFunctionId, index: usize) -> ValueId {
        self.module.function(function).value_parameters[index]
    }

    pub fn field(&mut self, parent: Option<ClassId>, name: &str, ty: IrType) -> FieldId {
        let id = FieldId(self.module.fields.len() as u32);
        let origin = parent
            .map(|p| self.module.class(p).origin.clone())
            .unwrap_or(Origin::Local);
        self.module.fields.push(IrField {
            name: name.to_string(),
            parent,
            ty,
            initializer: None,
            origin,
        });
        if let Some(parent) = parent {
            self.module.classes[parent.index()].fields.push(id);
        }
        id
    }

    pub fn set_field_initializer(&mut self, field: FieldId, initializer: ExprId) {
        self.module.fields[field.index()].initializer = Some(initializer);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Expressions
    // ═══════════════════════════════════════════════════════════════════════

    pub fn expr(&mut self, kind: ExprKind, ty: IrType) -> ExprId {
        let id = ExprId(self.module.expressions.len() as u32);
        self.module.expressions.push(IrExpression { kind, ty });
        id
    }

    pub fn constant(&mut self, ty: IrType) -> ExprId {
        self.expr(ExprKind::Const, ty)
    }

    pub fn get(&mut self, value: ValueId) -> ExprId {
        let ty = self.module.value(value).ty.clone();
        self.expr(ExprKind::GetValue(value), ty)
    }

    pub fn set(&mut self, variable: ValueId, value: ExprId) -> ExprId {
        let unit = self.unit_type();
        self.expr(ExprKind::SetValue { variable, value }, unit)
    }

    pub fn declare(&mut self, variable: ValueId, initializer: Option<ExprId>) -> ExprId {
        let unit = self.unit_type();
        self.expr(ExprKind::Variable { variable, initializer }, unit)
    }

    pub fn block(&mut self, statements: Vec<ExprId>, ty: IrType) -> ExprId {
        self.expr(ExprKind::Block { statements }, ty)
    }

    pub fn returnable_block(&mut self, statements: Vec<ExprId>, ty: IrType) -> ExprId {
        self.expr(ExprKind::ReturnableBlock { statements }, ty)
    }

    /// Append to a block; returns targeting a returnable block are created after it
    pub fn push_statement(&mut self, block: ExprId, statement: ExprId) {
        match &mut self.module.expr_mut(block).kind {
            ExprKind::Block { statements } | ExprKind::ReturnableBlock { statements } => {
                statements.push(statement)
            }
            other => panic!("push_statement on {}", other.name()),
        }
    }

    pub fn when(&mut self, branches: Vec<(ExprId, ExprId)>, ty: IrType) -> ExprId {
        let branches = branches
            .into_iter()
            .map(|(condition, result)| Branch { condition, result })
            .collect();
        self.expr(ExprKind::When { branches }, ty)
    }

    pub fn try_catch(&mut self, result: ExprId, catches: Vec<(ValueId, ExprId)>, ty: IrType) -> ExprId {
        let catches = catches
            .into_iter()
            .map(|(parameter, result)| Catch { parameter, result })
            .collect();
        self.expr(
            ExprKind::Try {
                result,
                catches,
                finally: None,
            },
            ty,
        )
    }

    pub fn ret(&mut self, value: ExprId) -> ExprId {
        let nothing = self.nothing_type();
        self.expr(
            ExprKind::Return {
                target: ReturnTarget::Function,
                value,
            },
            nothing,
        )
    }

    pub fn ret_from_block(&mut self, block: ExprId, value: ExprId) -> ExprId {
        let nothing = self.nothing_type();
        self.expr(
            ExprKind::Return {
                target: ReturnTarget::Block(block),
                value,
            },
            nothing,
        )
    }

    pub fn throw(&mut self, value: ExprId) -> ExprId {
        let nothing = self.nothing_type();
        self.expr(ExprKind::Throw { value }, nothing)
    }

    /// Call with the callee's return type; `receiver` is the dispatch receiver
    pub fn call(&mut self, callee: IrFunctionId, receiver: Option<ExprId>, arguments: Vec<ExprId>) -> ExprId {
        self.call_expr(CallExpr {
            callee,
            dispatch_receiver: receiver,
            extension_receiver: None,
            arguments,
            type_arguments: Vec::new(),
            super_qualifier: None,
        })
    }

    pub fn super_call(
        &mut self,
        callee: IrFunctionId,
        receiver: ExprId,
        arguments: Vec<ExprId>,
        qualifier: ClassId,
    ) -> ExprId {
        self.call_expr(CallExpr {
            callee,
            dispatch_receiver: Some(receiver),
            extension_receiver: None,
            arguments,
            type_arguments: Vec::new(),
            super_qualifier: Some(qualifier),
        })
    }

    pub fn call_expr(&mut self, call: CallExpr) -> ExprId {
        let ty = self.module.function(call.callee).return_type.clone();
        self.expr(ExprKind::Call(call), ty)
    }

    pub fn new_object(&mut self, constructor: IrFunctionId, arguments: Vec<ExprId>) -> ExprId {
        let ty = self.module.function(constructor).return_type.clone();
        self.expr(
            ExprKind::ConstructorCall {
                constructor,
                arguments,
                type_arguments: Vec::new(),
            },
            ty,
        )
    }

    pub fn delegate(&mut self, constructor: IrFunctionId, arguments: Vec<ExprId>) -> ExprId {
        let unit = self.unit_type();
        self.expr(
            ExprKind::DelegatingConstructorCall {
                constructor,
                arguments,
            },
            unit,
        )
    }

    pub fn get_field(&mut self, field: FieldId, receiver: Option<ExprId>) -> ExprId {
        let ty = self.module.field(field).ty.clone();
        self.expr(ExprKind::GetField { field, receiver }, ty)
    }

    pub fn set_field(&mut self, field: FieldId, receiver: Option<ExprId>, value: ExprId) -> ExprId {
        let unit = self.unit_type();
        self.expr(
            ExprKind::SetField {
                field,
                receiver,
                value,
            },
            unit,
        )
    }

    pub fn get_object(&mut self, class: ClassId) -> ExprId {
        self.expr(ExprKind::GetObject(class), IrType::class(class))
    }

    pub fn alloc_instance(&mut self, class: ClassId) -> ExprId {
        self.expr(ExprKind::AllocInstance(class), IrType::class(class))
    }

    pub fn cast(&mut self, argument: ExprId, to: IrType) -> ExprId {
        self.type_operator(TypeOperator::Cast, to.clone(), argument, to)
    }

    pub fn type_operator(
        &mut self,
        operator: TypeOperator,
        operand: IrType,
        argument: ExprId,
        ty: IrType,
    ) -> ExprId {
        self.expr(
            ExprKind::TypeOperator {
                operator,
                operand,
                argument,
            },
            ty,
        )
    }

    pub fn vararg(&mut self, elements: Vec<ExprId>, ty: IrType) -> ExprId {
        self.expr(ExprKind::Vararg { elements }, ty)
    }

    pub fn function_reference(&mut self, function: IrFunctionId, ty: IrType) -> ExprId {
        self.expr(ExprKind::FunctionReference(function), ty)
    }

    pub fn while_loop(&mut self, condition: ExprId, body: ExprId) -> ExprId {
        let unit = self.unit_type();
        self.expr(
            ExprKind::Loop {
                condition,
                body: Some(body),
            },
            unit,
        )
    }
}

fn signature(name: &str, arity: usize) -> String {
    format!("{}/{}", name, arity)
}
