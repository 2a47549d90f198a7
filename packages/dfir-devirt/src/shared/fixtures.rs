//! Hand-built DFIR programs for unit tests

use crate::features::dfir::domain::{
    Call, DfgProgram, Edge, ExternalModulesDfg, Function, FunctionAttributes, FunctionBody,
    FunctionId, FunctionParameter, ModuleDfg, ModuleSymbolTable, Node, NodeId, SymbolArena, TypeId,
    VariableKind,
};
use std::collections::BTreeMap;

pub struct DfgFixture {
    pub arena: SymbolArena,
    pub module: ModuleDfg,
    pub external: ExternalModulesDfg,
}

impl DfgFixture {
    pub fn new(name: &str) -> Self {
        let mut arena = SymbolArena::new();
        let module = arena.add_module(name);
        Self {
            arena,
            module: ModuleDfg {
                name: name.to_string(),
                functions: BTreeMap::new(),
                symbol_table: ModuleSymbolTable::new(module),
            },
            external: ExternalModulesDfg::default(),
        }
    }

    pub fn program(&self) -> DfgProgram<'_> {
        DfgProgram::new(&self.module, &self.external, &self.arena)
    }

    /// Private declared type of the module
    pub fn class(&mut self, name: &str, is_final: bool, is_abstract: bool, supers: &[TypeId]) -> TypeId {
        let ty = self
            .arena
            .new_private_type(is_final, is_abstract, Some(name.to_string()));
        self.arena.ty_mut(ty).super_types = supers.to_vec();
        self.module.symbol_table.types.push(ty);
        ty
    }

    /// Private function with the given parameter types
    pub fn function(&mut self, name: &str, params: &[TypeId], returns: TypeId) -> FunctionId {
        let module = self.module.symbol_table.module;
        let index = self.arena.module(module).number_of_functions as i32;
        self.arena.module_mut(module).number_of_functions += 1;
        let f = self
            .arena
            .new_private_function(module, index, Some(name.to_string()));
        self.set_signature(f, params, returns);
        f
    }

    pub fn public_function(&mut self, name: &str, params: &[TypeId], returns: TypeId) -> FunctionId {
        let module = self.module.symbol_table.module;
        let index = self.arena.module(module).number_of_functions as i32;
        self.arena.module_mut(module).number_of_functions += 1;
        let hash = crate::shared::local_hash(name);
        let f = self
            .arena
            .intern_public_function(hash, module, index, Some(name.to_string()));
        self.set_signature(f, params, returns);
        f
    }

    fn set_signature(&mut self, f: FunctionId, params: &[TypeId], returns: TypeId) {
        let symbol = self.arena.function_mut(f);
        symbol.parameters = params.iter().map(|&t| FunctionParameter::plain(t)).collect();
        symbol.return_parameter = FunctionParameter::plain(returns);
    }

    pub fn mark_global_initializer(&mut self, f: FunctionId) {
        let symbol = self.arena.function_mut(f);
        symbol.attributes = symbol
            .attributes
            .with(FunctionAttributes::IS_GLOBAL_INITIALIZER);
    }

    pub fn set_entry_point(&mut self, f: FunctionId) {
        self.module.symbol_table.entry_point = Some(f);
    }

    pub fn set_vtable(&mut self, ty: TypeId, vtable: &[FunctionId]) {
        self.arena.ty_mut(ty).vtable = vtable.to_vec();
    }

    pub fn set_itable(&mut self, ty: TypeId, method_hash: u64, f: FunctionId) {
        self.arena.ty_mut(ty).itable.insert(method_hash, f);
    }

    /// Give `f` a body; synthetic returns and throws variables are appended
    pub fn define(&mut self, f: FunctionId, mut nodes: Vec<Node>, returned: &[u32]) {
        let return_type = self.arena.function(f).return_parameter.ty;
        let returns = NodeId(nodes.len() as u32);
        nodes.push(Node::Variable {
            values: returned.iter().map(|&n| Edge::new(NodeId(n))).collect(),
            ty: return_type,
            kind: VariableKind::Temporary,
        });
        let throws = NodeId(nodes.len() as u32);
        nodes.push(Node::Variable {
            values: Vec::new(),
            ty: TypeId::VIRTUAL,
            kind: VariableKind::Temporary,
        });
        self.module.functions.insert(
            f,
            Function {
                symbol: f,
                body: FunctionBody {
                    nodes,
                    returns,
                    throws,
                },
            },
        );
    }

    /// Trivial body returning nothing
    pub fn define_empty(&mut self, f: FunctionId) {
        self.define(f, Vec::new(), &[]);
    }
}

pub fn call(callee: FunctionId, arguments: &[u32], return_type: TypeId) -> Call {
    Call {
        callee,
        arguments: arguments.iter().map(|&n| Edge::new(NodeId(n))).collect(),
        return_type,
        call_site: None,
    }
}
