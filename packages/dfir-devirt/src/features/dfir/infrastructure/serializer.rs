//! Binary DFIR serialization
//!
//! Framing: `[u32_le version][u32_le payload length][payload]`. The payload
//! holds the module name, the symbol table (types, then function symbols) and
//! the function bodies. Symbols are referenced by their position in the blob's
//! symbol table; node edges by their index in the function body. Optional
//! values carry a presence byte, arrays a `u32` length prefix.

use crate::errors::{DevirtError, Result};
use crate::features::dfir::domain::{
    Call, Dispatch, Edge, ExternalAnnotations, ExternalModulesDfg, Field, Function,
    FunctionAttributes, FunctionBody, FunctionId, FunctionParameter, FunctionSymbolKind,
    LibraryBlob, ModuleDfg, Node, NodeId, SymbolArena, TypeId, TypeKind, VariableKind,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::io::{Cursor, Write};
use tracing::{debug, info};

/// Version tag of the serialized format
pub const DFIR_FORMAT_VERSION: u32 = 1;

mod tag {
    pub const TYPE_VIRTUAL: u8 = 0;
    pub const TYPE_EXTERNAL: u8 = 1;
    pub const TYPE_PUBLIC: u8 = 2;
    pub const TYPE_PRIVATE: u8 = 3;

    pub const FUNCTION_EXTERNAL: u8 = 1;
    pub const FUNCTION_PUBLIC: u8 = 2;
    pub const FUNCTION_PRIVATE: u8 = 3;

    pub const NODE_UNKNOWN: u8 = 0;
    pub const NODE_PARAMETER: u8 = 1;
    pub const NODE_CONST: u8 = 2;
    pub const NODE_STATIC_CALL: u8 = 3;
    pub const NODE_NEW_OBJECT: u8 = 4;
    pub const NODE_VTABLE_CALL: u8 = 5;
    pub const NODE_ITABLE_CALL: u8 = 6;
    pub const NODE_SINGLETON: u8 = 7;
    pub const NODE_FIELD_READ: u8 = 8;
    pub const NODE_FIELD_WRITE: u8 = 9;
    pub const NODE_VARIABLE: u8 = 10;
    pub const NODE_ALLOC_INSTANCE: u8 = 11;
    pub const NODE_ARRAY_READ: u8 = 12;
    pub const NODE_ARRAY_WRITE: u8 = 13;
}

pub struct DfgSerializer;

impl DfgSerializer {
    /// Serialize the module DFIR and every symbol it references
    pub fn serialize(module: &ModuleDfg, arena: &SymbolArena) -> Result<Vec<u8>> {
        let index = SymbolIndex::collect(module, arena);

        let mut payload = Writer::default();
        payload.string(&module.name)?;

        payload.u32(index.types.len() as u32)?;
        for &ty in &index.types {
            payload.ty(ty, arena, &index)?;
        }
        payload.u32(index.functions.len() as u32)?;
        for &function in &index.functions {
            payload.function_symbol(function, arena, &index)?;
        }
        payload.u32(module.functions.len() as u32)?;
        for function in module.functions.values() {
            payload.function(function, &index)?;
        }

        let mut out = Vec::with_capacity(payload.buf.len() + 8);
        out.write_u32::<LittleEndian>(DFIR_FORMAT_VERSION)?;
        out.write_u32::<LittleEndian>(payload.buf.len() as u32)?;
        out.write_all(&payload.buf)?;
        debug!(
            module = %module.name,
            types = index.types.len(),
            functions = index.functions.len(),
            bytes = out.len(),
            "Serialized module DFIR"
        );
        Ok(out)
    }

    /// Load library blobs into `arena`; public declarations are merged by hash
    pub fn deserialize(blobs: &[LibraryBlob], arena: &mut SymbolArena) -> Result<ExternalModulesDfg> {
        let mut external = ExternalModulesDfg::default();
        for blob in blobs {
            let mut reader = Reader::new(&blob.name, &blob.bytes);
            let version = reader.u32()?;
            if version != DFIR_FORMAT_VERSION {
                return Err(DevirtError::VersionMismatch {
                    library: blob.name.clone(),
                    found: version,
                    expected: DFIR_FORMAT_VERSION,
                });
            }
            let length = reader.u32()? as usize;
            if length != reader.remaining() {
                return Err(reader.error(format!(
                    "payload length {} does not match {} remaining bytes",
                    length,
                    reader.remaining()
                )));
            }
            let functions = load_library(&mut reader, arena, &mut external)?;
            info!(library = %blob.name, functions, "Loaded library DFIR");
        }
        Ok(external)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Writing
// ═══════════════════════════════════════════════════════════════════════════

/// Blob-local numbering of every symbol reachable from the module
struct SymbolIndex {
    types: Vec<TypeId>,
    type_index: FxHashMap<TypeId, u32>,
    functions: Vec<FunctionId>,
    function_index: FxHashMap<FunctionId, u32>,
}

impl SymbolIndex {
    fn collect(module: &ModuleDfg, arena: &SymbolArena) -> Self {
        let mut index = SymbolIndex {
            types: Vec::new(),
            type_index: FxHashMap::default(),
            functions: Vec::new(),
            function_index: FxHashMap::default(),
        };
        let mut pending_types = VecDeque::new();
        let mut pending_functions = VecDeque::new();

        index.add_type(TypeId::VIRTUAL, &mut pending_types);
        for &ty in &module.symbol_table.types {
            index.add_type(ty, &mut pending_types);
        }
        for function in module.functions.values() {
            index.add_function(function.symbol, &mut pending_functions);
            for node in &function.body.nodes {
                for ty in node_types(node) {
                    index.add_type(ty, &mut pending_types);
                }
                for callee in node_functions(node) {
                    index.add_function(callee, &mut pending_functions);
                }
            }
        }

        while !pending_types.is_empty() || !pending_functions.is_empty() {
            while let Some(ty) = pending_types.pop_front() {
                let declared = arena.ty(ty);
                for &super_type in &declared.super_types {
                    index.add_type(super_type, &mut pending_types);
                }
                for &slot in &declared.vtable {
                    index.add_function(slot, &mut pending_functions);
                }
                let mut itable: Vec<(&u64, &FunctionId)> = declared.itable.iter().collect();
                itable.sort();
                for (_, &implementation) in itable {
                    index.add_function(implementation, &mut pending_functions);
                }
            }
            while let Some(function) = pending_functions.pop_front() {
                let symbol = arena.function(function);
                for parameter in symbol.parameters.iter().chain(std::iter::once(&symbol.return_parameter)) {
                    index.add_type(parameter.ty, &mut pending_types);
                    for adapter in [parameter.box_function, parameter.unbox_function].into_iter().flatten() {
                        index.add_function(adapter, &mut pending_functions);
                    }
                }
            }
        }
        index
    }

    fn add_type(&mut self, ty: TypeId, pending: &mut VecDeque<TypeId>) {
        if !self.type_index.contains_key(&ty) {
            self.type_index.insert(ty, self.types.len() as u32);
            self.types.push(ty);
            pending.push_back(ty);
        }
    }

    fn add_function(&mut self, function: FunctionId, pending: &mut VecDeque<FunctionId>) {
        if !self.function_index.contains_key(&function) {
            self.function_index.insert(function, self.functions.len() as u32);
            self.functions.push(function);
            pending.push_back(function);
        }
    }

    fn ty(&self, ty: TypeId) -> u32 {
        self.type_index[&ty]
    }

    fn function(&self, function: FunctionId) -> u32 {
        self.function_index[&function]
    }
}

fn node_types(node: &Node) -> Vec<TypeId> {
    let mut types = Vec::new();
    if let Some(call) = node.as_call() {
        types.push(call.return_type);
    }
    match node {
        Node::Const { ty } | Node::AllocInstance { ty } | Node::Singleton { ty, .. } => types.push(*ty),
        Node::StaticCall { receiver_type, .. } => types.extend(receiver_type.iter().copied()),
        Node::NewObject {
            constructed_type, ..
        } => types.push(*constructed_type),
        Node::VirtualCall { receiver_type, .. } => types.push(*receiver_type),
        Node::FieldRead { field, .. } | Node::FieldWrite { field, .. } => {
            types.extend(field.receiver_type.iter().copied());
            types.push(field.ty);
        }
        Node::Variable { ty, .. } => types.push(*ty),
        Node::Parameter { .. } | Node::ArrayRead { .. } | Node::ArrayWrite { .. } => {}
    }
    types.extend(node.edges().iter().filter_map(|e| e.cast_to));
    types
}

fn node_functions(node: &Node) -> Vec<FunctionId> {
    match node {
        Node::Singleton {
            constructor: Some(constructor),
            ..
        } => vec![*constructor],
        _ => node.as_call().map(|c| vec![c.callee]).unwrap_or_default(),
    }
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, v: u8) -> Result<()> {
        Ok(self.buf.write_u8(v)?)
    }

    fn u32(&mut self, v: u32) -> Result<()> {
        Ok(self.buf.write_u32::<LittleEndian>(v)?)
    }

    fn i32(&mut self, v: i32) -> Result<()> {
        Ok(self.buf.write_i32::<LittleEndian>(v)?)
    }

    fn u64(&mut self, v: u64) -> Result<()> {
        Ok(self.buf.write_u64::<LittleEndian>(v)?)
    }

    fn bool(&mut self, v: bool) -> Result<()> {
        self.u8(v as u8)
    }

    fn string(&mut self, s: &str) -> Result<()> {
        self.u32(s.len() as u32)?;
        Ok(self.buf.write_all(s.as_bytes())?)
    }

    fn opt_string(&mut self, s: Option<&str>) -> Result<()> {
        match s {
            Some(s) => {
                self.bool(true)?;
                self.string(s)
            }
            None => self.bool(false),
        }
    }

    fn opt_u32(&mut self, v: Option<u32>) -> Result<()> {
        match v {
            Some(v) => {
                self.bool(true)?;
                self.u32(v)
            }
            None => self.bool(false),
        }
    }

    fn u32_array(&mut self, values: &[u32]) -> Result<()> {
        self.u32(values.len() as u32)?;
        for &v in values {
            self.u32(v)?;
        }
        Ok(())
    }

    fn ty(&mut self, ty: TypeId, arena: &SymbolArena, index: &SymbolIndex) -> Result<()> {
        let declared = arena.ty(ty);
        match declared.kind {
            TypeKind::Virtual => self.u8(tag::TYPE_VIRTUAL)?,
            TypeKind::External { hash } => {
                self.u8(tag::TYPE_EXTERNAL)?;
                self.u64(hash)?;
            }
            TypeKind::Public { hash } => {
                self.u8(tag::TYPE_PUBLIC)?;
                self.u64(hash)?;
            }
            TypeKind::Private { index: private } => {
                self.u8(tag::TYPE_PRIVATE)?;
                self.u32(private)?;
            }
        }
        if declared.is_declared() {
            self.bool(declared.is_final)?;
            self.bool(declared.is_abstract)?;
            let super_types: Vec<u32> = declared.super_types.iter().map(|&t| index.ty(t)).collect();
            self.u32_array(&super_types)?;
            let vtable: Vec<u32> = declared.vtable.iter().map(|&f| index.function(f)).collect();
            self.u32_array(&vtable)?;
            let mut itable: Vec<(u64, FunctionId)> = declared.itable.iter().map(|(&h, &f)| (h, f)).collect();
            itable.sort();
            self.u32(itable.len() as u32)?;
            for (hash, implementation) in itable {
                self.u64(hash)?;
                self.u32(index.function(implementation))?;
            }
        }
        self.opt_string(declared.name.as_deref())
    }

    fn parameter(&mut self, parameter: &FunctionParameter, index: &SymbolIndex) -> Result<()> {
        self.u32(index.ty(parameter.ty))?;
        self.opt_u32(parameter.box_function.map(|f| index.function(f)))?;
        self.opt_u32(parameter.unbox_function.map(|f| index.function(f)))
    }

    fn function_symbol(&mut self, function: FunctionId, arena: &SymbolArena, index: &SymbolIndex) -> Result<()> {
        let symbol = arena.function(function);
        match &symbol.kind {
            FunctionSymbolKind::External { hash, annotations } => {
                self.u8(tag::FUNCTION_EXTERNAL)?;
                self.u64(*hash)?;
                self.opt_u32(annotations.escapes)?;
                match &annotations.points_to {
                    Some(points_to) => {
                        self.bool(true)?;
                        self.u32_array(points_to)?;
                    }
                    None => self.bool(false)?,
                }
            }
            FunctionSymbolKind::Public {
                hash,
                symbol_table_index,
            } => {
                self.u8(tag::FUNCTION_PUBLIC)?;
                self.u64(*hash)?;
                self.i32(*symbol_table_index)?;
            }
            FunctionSymbolKind::Private {
                index: private,
                symbol_table_index,
            } => {
                self.u8(tag::FUNCTION_PRIVATE)?;
                self.u32(*private)?;
                self.i32(*symbol_table_index)?;
            }
        }
        self.u32(symbol.attributes.0)?;
        self.u32(symbol.parameters.len() as u32)?;
        for parameter in &symbol.parameters {
            self.parameter(parameter, index)?;
        }
        self.parameter(&symbol.return_parameter, index)?;
        self.opt_string(symbol.name.as_deref())
    }

    fn edge(&mut self, edge: &Edge, index: &SymbolIndex) -> Result<()> {
        self.u32(edge.node.0)?;
        self.opt_u32(edge.cast_to.map(|t| index.ty(t)))
    }

    fn opt_edge(&mut self, edge: &Option<Edge>, index: &SymbolIndex) -> Result<()> {
        match edge {
            Some(edge) => {
                self.bool(true)?;
                self.edge(edge, index)
            }
            None => self.bool(false),
        }
    }

    fn call(&mut self, call: &Call, index: &SymbolIndex) -> Result<()> {
        self.u32(index.function(call.callee))?;
        self.u32(call.arguments.len() as u32)?;
        for argument in &call.arguments {
            self.edge(argument, index)?;
        }
        self.u32(index.ty(call.return_type))
    }

    fn field(&mut self, field: &Field, index: &SymbolIndex) -> Result<()> {
        self.opt_u32(field.receiver_type.map(|t| index.ty(t)))?;
        self.u32(index.ty(field.ty))?;
        self.u64(field.hash)?;
        self.opt_string(field.name.as_deref())
    }

    fn node(&mut self, node: &Node, index: &SymbolIndex) -> Result<()> {
        match node {
            Node::Parameter { index: parameter } => {
                self.u8(tag::NODE_PARAMETER)?;
                self.u32(*parameter)
            }
            Node::Const { ty } => {
                self.u8(tag::NODE_CONST)?;
                self.u32(index.ty(*ty))
            }
            Node::StaticCall {
                call,
                receiver_type,
            } => {
                self.u8(tag::NODE_STATIC_CALL)?;
                self.call(call, index)?;
                self.opt_u32(receiver_type.map(|t| index.ty(t)))
            }
            Node::NewObject {
                call,
                constructed_type,
            } => {
                self.u8(tag::NODE_NEW_OBJECT)?;
                self.call(call, index)?;
                self.u32(index.ty(*constructed_type))
            }
            Node::VirtualCall {
                call,
                receiver_type,
                dispatch,
            } => {
                match dispatch {
                    Dispatch::Vtable { .. } => self.u8(tag::NODE_VTABLE_CALL)?,
                    Dispatch::Itable { .. } => self.u8(tag::NODE_ITABLE_CALL)?,
                }
                self.call(call, index)?;
                self.u32(index.ty(*receiver_type))?;
                match dispatch {
                    Dispatch::Vtable { index: slot } => self.u32(*slot),
                    Dispatch::Itable { method_hash } => self.u64(*method_hash),
                }
            }
            Node::Singleton { ty, constructor } => {
                self.u8(tag::NODE_SINGLETON)?;
                self.u32(index.ty(*ty))?;
                self.opt_u32(constructor.map(|f| index.function(f)))
            }
            Node::AllocInstance { ty } => {
                self.u8(tag::NODE_ALLOC_INSTANCE)?;
                self.u32(index.ty(*ty))
            }
            Node::FieldRead { receiver, field } => {
                self.u8(tag::NODE_FIELD_READ)?;
                self.opt_edge(receiver, index)?;
                self.field(field, index)
            }
            Node::FieldWrite {
                receiver,
                field,
                value,
            } => {
                self.u8(tag::NODE_FIELD_WRITE)?;
                self.opt_edge(receiver, index)?;
                self.field(field, index)?;
                self.edge(value, index)
            }
            Node::ArrayRead { array, index: item } => {
                self.u8(tag::NODE_ARRAY_READ)?;
                self.edge(array, index)?;
                self.edge(item, index)
            }
            Node::ArrayWrite {
                array,
                index: item,
                value,
            } => {
                self.u8(tag::NODE_ARRAY_WRITE)?;
                self.edge(array, index)?;
                self.edge(item, index)?;
                self.edge(value, index)
            }
            Node::Variable { values, ty, kind } => {
                self.u8(tag::NODE_VARIABLE)?;
                self.u32(values.len() as u32)?;
                for value in values {
                    self.edge(value, index)?;
                }
                self.u32(index.ty(*ty))?;
                self.u8(match kind {
                    VariableKind::Ordinary => 0,
                    VariableKind::Temporary => 1,
                    VariableKind::CatchParameter => 2,
                })
            }
        }
    }

    fn function(&mut self, function: &Function, index: &SymbolIndex) -> Result<()> {
        self.u32(index.function(function.symbol))?;
        self.u32(function.body.nodes.len() as u32)?;
        for node in &function.body.nodes {
            self.node(node, index)?;
        }
        self.u32(function.body.returns.0)?;
        self.u32(function.body.throws.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Reading
// ═══════════════════════════════════════════════════════════════════════════

struct Reader<'b> {
    library: &'b str,
    cursor: Cursor<&'b [u8]>,
}

impl<'b> Reader<'b> {
    fn new(library: &'b str, bytes: &'b [u8]) -> Self {
        Self {
            library,
            cursor: Cursor::new(bytes),
        }
    }

    fn error(&self, reason: impl Into<String>) -> DevirtError {
        DevirtError::format(self.library, reason)
    }

    fn remaining(&self) -> usize {
        let total = self.cursor.get_ref().len();
        total.saturating_sub(self.cursor.position() as usize)
    }

    fn eof(&self) -> DevirtError {
        self.error(format!("unexpected end of data at offset {}", self.cursor.position()))
    }

    fn u8(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(|_| self.eof())
    }

    fn u32(&mut self) -> Result<u32> {
        self.cursor.read_u32::<LittleEndian>().map_err(|_| self.eof())
    }

    fn i32(&mut self) -> Result<i32> {
        self.cursor.read_i32::<LittleEndian>().map_err(|_| self.eof())
    }

    fn u64(&mut self) -> Result<u64> {
        self.cursor.read_u64::<LittleEndian>().map_err(|_| self.eof())
    }

    fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.error(format!("invalid presence byte {}", other))),
        }
    }

    /// Array length, rejected when the remaining bytes cannot hold it
    fn len(&mut self, min_element_size: usize) -> Result<usize> {
        let len = self.u32()? as usize;
        if len.saturating_mul(min_element_size) > self.remaining() {
            return Err(self.error(format!("array length {} exceeds remaining data", len)));
        }
        Ok(len)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.len(1)?;
        let start = self.cursor.position() as usize;
        let bytes = &self.cursor.get_ref()[start..start + len];
        let s = std::str::from_utf8(bytes)
            .map_err(|e| self.error(format!("invalid UTF-8 string: {}", e)))?
            .to_string();
        self.cursor.set_position((start + len) as u64);
        Ok(s)
    }

    fn opt_string(&mut self) -> Result<Option<String>> {
        if self.bool()? {
            Ok(Some(self.string()?))
        } else {
            Ok(None)
        }
    }

    fn opt_u32(&mut self) -> Result<Option<u32>> {
        if self.bool()? {
            Ok(Some(self.u32()?))
        } else {
            Ok(None)
        }
    }

    fn u32_array(&mut self) -> Result<Vec<u32>> {
        let len = self.len(4)?;
        (0..len).map(|_| self.u32()).collect()
    }
}

struct RawType {
    tag: u8,
    hash: u64,
    is_final: bool,
    is_abstract: bool,
    super_types: Vec<u32>,
    vtable: Vec<u32>,
    itable: Vec<(u64, u32)>,
    name: Option<String>,
}

struct RawParameter {
    ty: u32,
    box_function: Option<u32>,
    unbox_function: Option<u32>,
}

struct RawFunction {
    tag: u8,
    hash: u64,
    symbol_table_index: i32,
    annotations: ExternalAnnotations,
    attributes: u32,
    parameters: Vec<RawParameter>,
    return_parameter: RawParameter,
    name: Option<String>,
}

fn read_type(reader: &mut Reader<'_>) -> Result<RawType> {
    let tag = reader.u8()?;
    let mut raw = RawType {
        tag,
        hash: 0,
        is_final: false,
        is_abstract: false,
        super_types: Vec::new(),
        vtable: Vec::new(),
        itable: Vec::new(),
        name: None,
    };
    match tag {
        tag::TYPE_VIRTUAL => {}
        tag::TYPE_EXTERNAL | tag::TYPE_PUBLIC => raw.hash = reader.u64()?,
        tag::TYPE_PRIVATE => {
            reader.u32()?;
        }
        other => return Err(reader.error(format!("unknown type tag {}", other))),
    }
    if matches!(tag, tag::TYPE_PUBLIC | tag::TYPE_PRIVATE) {
        raw.is_final = reader.bool()?;
        raw.is_abstract = reader.bool()?;
        if raw.is_final && raw.is_abstract {
            return Err(reader.error("type is both final and abstract"));
        }
        raw.super_types = reader.u32_array()?;
        raw.vtable = reader.u32_array()?;
        let len = reader.len(12)?;
        for _ in 0..len {
            let hash = reader.u64()?;
            raw.itable.push((hash, reader.u32()?));
        }
    }
    raw.name = reader.opt_string()?;
    Ok(raw)
}

fn read_parameter(reader: &mut Reader<'_>) -> Result<RawParameter> {
    Ok(RawParameter {
        ty: reader.u32()?,
        box_function: reader.opt_u32()?,
        unbox_function: reader.opt_u32()?,
    })
}

fn read_function_symbol(reader: &mut Reader<'_>) -> Result<RawFunction> {
    let tag = reader.u8()?;
    let mut hash = 0;
    let mut symbol_table_index = -1;
    let mut annotations = ExternalAnnotations::default();
    match tag {
        tag::FUNCTION_EXTERNAL => {
            hash = reader.u64()?;
            annotations.escapes = reader.opt_u32()?;
            if reader.bool()? {
                annotations.points_to = Some(reader.u32_array()?);
            }
        }
        tag::FUNCTION_PUBLIC => {
            hash = reader.u64()?;
            symbol_table_index = reader.i32()?;
        }
        tag::FUNCTION_PRIVATE => {
            reader.u32()?;
            symbol_table_index = reader.i32()?;
        }
        other => return Err(reader.error(format!("unknown function symbol tag {}", other))),
    }
    let attributes = reader.u32()?;
    let len = reader.len(4)?;
    let mut parameters = Vec::with_capacity(len);
    for _ in 0..len {
        parameters.push(read_parameter(reader)?);
    }
    let return_parameter = read_parameter(reader)?;
    Ok(RawFunction {
        tag,
        hash,
        symbol_table_index,
        annotations,
        attributes,
        parameters,
        return_parameter,
        name: reader.opt_string()?,
    })
}

/// Blob-local index to arena identity
struct Remap<'r> {
    library: &'r str,
    types: Vec<TypeId>,
    functions: Vec<FunctionId>,
}

impl Remap<'_> {
    fn ty(&self, index: u32) -> Result<TypeId> {
        self.types
            .get(index as usize)
            .copied()
            .ok_or_else(|| DevirtError::format(self.library, format!("type index {} out of range", index)))
    }

    fn function(&self, index: u32) -> Result<FunctionId> {
        self.functions.get(index as usize).copied().ok_or_else(|| {
            DevirtError::format(self.library, format!("function index {} out of range", index))
        })
    }

    fn opt_function(&self, index: Option<u32>) -> Result<Option<FunctionId>> {
        index.map(|i| self.function(i)).transpose()
    }

    fn parameter(&self, raw: &RawParameter) -> Result<FunctionParameter> {
        Ok(FunctionParameter {
            ty: self.ty(raw.ty)?,
            box_function: self.opt_function(raw.box_function)?,
            unbox_function: self.opt_function(raw.unbox_function)?,
        })
    }
}

fn load_library(
    reader: &mut Reader<'_>,
    arena: &mut SymbolArena,
    external: &mut ExternalModulesDfg,
) -> Result<usize> {
    let library = reader.library;
    let name = reader.string()?;
    let module = arena.add_module(name);

    let len = reader.len(1)?;
    let mut raw_types = Vec::with_capacity(len);
    for _ in 0..len {
        raw_types.push(read_type(reader)?);
    }
    let len = reader.len(1)?;
    let mut raw_functions = Vec::with_capacity(len);
    for _ in 0..len {
        raw_functions.push(read_function_symbol(reader)?);
    }

    // Identities first, layouts once every index can be resolved
    let mut remap = Remap {
        library,
        types: Vec::with_capacity(raw_types.len()),
        functions: Vec::with_capacity(raw_functions.len()),
    };
    let mut fresh_types = Vec::new();
    for (position, raw) in raw_types.iter().enumerate() {
        let known_types = arena.type_count();
        let ty = match raw.tag {
            tag::TYPE_VIRTUAL => TypeId::VIRTUAL,
            tag::TYPE_EXTERNAL => arena.intern_external_type(raw.hash, raw.name.clone()),
            tag::TYPE_PUBLIC => {
                let ty = arena.intern_public_type(raw.hash, raw.is_final, raw.is_abstract, raw.name.clone());
                external.public_types.insert(raw.hash, ty);
                ty
            }
            _ => arena.new_private_type(raw.is_final, raw.is_abstract, raw.name.clone()),
        };
        // Layouts of already known declarations are kept
        if arena.type_count() > known_types && arena.ty(ty).is_declared() {
            fresh_types.push(position);
        }
        if arena.ty(ty).is_declared() && !external.all_types.contains(&ty) {
            external.all_types.push(ty);
        }
        remap.types.push(ty);
    }

    let mut fresh_functions = Vec::new();
    let mut number_of_functions = 0u32;
    for (position, raw) in raw_functions.iter().enumerate() {
        let known_functions = arena.function_count();
        let function = match raw.tag {
            tag::FUNCTION_EXTERNAL => {
                arena.intern_external_function(raw.hash, raw.annotations.clone(), raw.name.clone())
            }
            tag::FUNCTION_PUBLIC => {
                let function =
                    arena.intern_public_function(raw.hash, module, raw.symbol_table_index, raw.name.clone());
                external.public_functions.insert(raw.hash, function);
                function
            }
            _ => arena.new_private_function(module, raw.symbol_table_index, raw.name.clone()),
        };
        if arena.function_count() > known_functions {
            fresh_functions.push(position);
        }
        if raw.tag != tag::FUNCTION_EXTERNAL && raw.symbol_table_index >= 0 {
            number_of_functions = number_of_functions.max(raw.symbol_table_index as u32 + 1);
        }
        remap.functions.push(function);
    }
    arena.module_mut(module).number_of_functions = number_of_functions;

    for position in fresh_types {
        let raw = &raw_types[position];
        let super_types = raw
            .super_types
            .iter()
            .map(|&t| remap.ty(t))
            .collect::<Result<Vec<_>>>()?;
        let vtable = raw
            .vtable
            .iter()
            .map(|&f| remap.function(f))
            .collect::<Result<Vec<_>>>()?;
        let mut itable = FxHashMap::default();
        for &(hash, f) in &raw.itable {
            itable.insert(hash, remap.function(f)?);
        }
        let target = arena.ty_mut(remap.types[position]);
        target.super_types = super_types;
        target.vtable = vtable;
        target.itable = itable;
    }

    for position in fresh_functions {
        let raw = &raw_functions[position];
        let parameters = raw
            .parameters
            .iter()
            .map(|p| remap.parameter(p))
            .collect::<Result<Vec<_>>>()?;
        let return_parameter = remap.parameter(&raw.return_parameter)?;
        let target = arena.function_mut(remap.functions[position]);
        target.attributes = FunctionAttributes(raw.attributes);
        target.parameters = parameters;
        target.return_parameter = return_parameter;
    }

    let count = reader.len(1)?;
    for _ in 0..count {
        let function = read_function(reader, &remap)?;
        external.function_dfgs.insert(function.symbol, function);
    }
    if reader.remaining() != 0 {
        return Err(reader.error(format!("{} trailing bytes", reader.remaining())));
    }
    Ok(count)
}

fn read_edge(reader: &mut Reader<'_>, remap: &Remap<'_>) -> Result<Edge> {
    let node = NodeId(reader.u32()?);
    let cast_to = reader.opt_u32()?.map(|t| remap.ty(t)).transpose()?;
    Ok(Edge { node, cast_to })
}

fn read_opt_edge(reader: &mut Reader<'_>, remap: &Remap<'_>) -> Result<Option<Edge>> {
    if reader.bool()? {
        Ok(Some(read_edge(reader, remap)?))
    } else {
        Ok(None)
    }
}

fn read_call(reader: &mut Reader<'_>, remap: &Remap<'_>) -> Result<Call> {
    let callee = remap.function(reader.u32()?)?;
    let len = reader.len(5)?;
    let mut arguments = Vec::with_capacity(len);
    for _ in 0..len {
        arguments.push(read_edge(reader, remap)?);
    }
    Ok(Call {
        callee,
        arguments,
        return_type: remap.ty(reader.u32()?)?,
        call_site: None,
    })
}

fn read_field(reader: &mut Reader<'_>, remap: &Remap<'_>) -> Result<Field> {
    let receiver_type = reader.opt_u32()?.map(|t| remap.ty(t)).transpose()?;
    Ok(Field {
        receiver_type,
        ty: remap.ty(reader.u32()?)?,
        hash: reader.u64()?,
        name: reader.opt_string()?,
    })
}

fn read_node(reader: &mut Reader<'_>, remap: &Remap<'_>) -> Result<Node> {
    let node = match reader.u8()? {
        tag::NODE_PARAMETER => Node::Parameter { index: reader.u32()? },
        tag::NODE_CONST => Node::Const {
            ty: remap.ty(reader.u32()?)?,
        },
        tag::NODE_STATIC_CALL => {
            let call = read_call(reader, remap)?;
            let receiver_type = reader.opt_u32()?.map(|t| remap.ty(t)).transpose()?;
            Node::StaticCall { call, receiver_type }
        }
        tag::NODE_NEW_OBJECT => {
            let call = read_call(reader, remap)?;
            Node::NewObject {
                call,
                constructed_type: remap.ty(reader.u32()?)?,
            }
        }
        tag::NODE_VTABLE_CALL => {
            let call = read_call(reader, remap)?;
            let receiver_type = remap.ty(reader.u32()?)?;
            Node::VirtualCall {
                call,
                receiver_type,
                dispatch: Dispatch::Vtable { index: reader.u32()? },
            }
        }
        tag::NODE_ITABLE_CALL => {
            let call = read_call(reader, remap)?;
            let receiver_type = remap.ty(reader.u32()?)?;
            Node::VirtualCall {
                call,
                receiver_type,
                dispatch: Dispatch::Itable {
                    method_hash: reader.u64()?,
                },
            }
        }
        tag::NODE_SINGLETON => {
            let ty = remap.ty(reader.u32()?)?;
            let constructor = remap.opt_function(reader.opt_u32()?)?;
            Node::Singleton { ty, constructor }
        }
        tag::NODE_FIELD_READ => {
            let receiver = read_opt_edge(reader, remap)?;
            Node::FieldRead {
                receiver,
                field: read_field(reader, remap)?,
            }
        }
        tag::NODE_FIELD_WRITE => {
            let receiver = read_opt_edge(reader, remap)?;
            let field = read_field(reader, remap)?;
            Node::FieldWrite {
                receiver,
                field,
                value: read_edge(reader, remap)?,
            }
        }
        tag::NODE_VARIABLE => {
            let len = reader.len(5)?;
            let mut values = Vec::with_capacity(len);
            for _ in 0..len {
                values.push(read_edge(reader, remap)?);
            }
            let ty = remap.ty(reader.u32()?)?;
            let kind = match reader.u8()? {
                0 => VariableKind::Ordinary,
                1 => VariableKind::Temporary,
                2 => VariableKind::CatchParameter,
                other => return Err(reader.error(format!("unknown variable kind {}", other))),
            };
            Node::Variable { values, ty, kind }
        }
        tag::NODE_ALLOC_INSTANCE => Node::AllocInstance {
            ty: remap.ty(reader.u32()?)?,
        },
        tag::NODE_ARRAY_READ => {
            let array = read_edge(reader, remap)?;
            Node::ArrayRead {
                array,
                index: read_edge(reader, remap)?,
            }
        }
        tag::NODE_ARRAY_WRITE => {
            let array = read_edge(reader, remap)?;
            let index = read_edge(reader, remap)?;
            Node::ArrayWrite {
                array,
                index,
                value: read_edge(reader, remap)?,
            }
        }
        tag::NODE_UNKNOWN => return Err(reader.error("node of unknown kind")),
        other => return Err(reader.error(format!("unknown node tag {}", other))),
    };
    Ok(node)
}

fn read_function(reader: &mut Reader<'_>, remap: &Remap<'_>) -> Result<Function> {
    let symbol = remap.function(reader.u32()?)?;
    let len = reader.len(1)?;
    let mut nodes = Vec::with_capacity(len);
    for _ in 0..len {
        nodes.push(read_node(reader, remap)?);
    }
    let returns = NodeId(reader.u32()?);
    let throws = NodeId(reader.u32()?);

    let in_range = |id: NodeId| id.index() < nodes.len();
    let dangling = nodes
        .iter()
        .flat_map(|n| n.edges())
        .map(|e| e.node)
        .chain([returns, throws])
        .find(|&id| !in_range(id));
    if let Some(id) = dangling {
        return Err(reader.error(format!("node reference #{} out of range", id.0)));
    }
    Ok(Function {
        symbol,
        body: FunctionBody {
            nodes,
            returns,
            throws,
        },
    })
}
