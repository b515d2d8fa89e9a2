use std::collections::HashMap;

use smalls_ast::{
    BraceInitFields, Expression, FStringPart, FieldDecl, FunctionDecl, Item, JumpStatement,
    LambdaBody, LambdaExpr, LiteralExpr, OperatorAlias, Program, Statement, SwitchLabel,
    SwitchStatement, TypeExpr,
};
use smalls_diagnostics::{error_codes, SourceRange};
use smalls_types::{OperatorKind, StructDef, StructField, SumDef, TypeArg, TypeDescriptor, TypeId, TypeKind};

use crate::const_eval::ConstEvaluator;
use crate::context::{CaptureInfo, ResolutionContext};
use crate::environment::Export;

/// One lambda literal currently being resolved, tracked so capture analysis
/// knows which scopes belong to it. `base_depth` is the frame index of the
/// lambda's own parameter scope -- any name resolved at a shallower frame
/// index was declared outside the lambda.
struct LambdaFrame {
    base_depth: usize,
    range: SourceRange,
}

/// Pass 2: turns every `TypeExpr` into a canonical `TypeId`, defines
/// struct/sum layouts and type-alias/newtype/opaque entries in the shared
/// `TypeRegistry`, records each function's resolved signature, and then
/// walks every function body (the "bodies pass") resolving expression
/// types, binding pattern-switch payloads, checking brace-initializer
/// forms, inferring generic call-site instantiations, and recording lambda
/// captures.
pub struct TypeResolver<'ctx, 'a> {
    ctx: &'ctx mut ResolutionContext<'a>,
    type_param_scope: HashMap<String, TypeId>,
    option_type_id: Option<TypeId>,
    lambda_stack: Vec<LambdaFrame>,
    current_return_type: Option<TypeId>,
}

impl<'ctx, 'a> TypeResolver<'ctx, 'a> {
    pub fn new(ctx: &'ctx mut ResolutionContext<'a>) -> Self {
        Self {
            ctx,
            type_param_scope: HashMap::new(),
            option_type_id: None,
            lambda_stack: Vec::new(),
            current_return_type: None,
        }
    }

    pub fn resolve_program(&mut self, program: &Program) {
        for item in &program.items {
            self.resolve_item(item, &program.module_name);
        }
    }

    fn qualified(&self, module_name: &str, name: &str) -> String {
        format!("{}.{}", module_name, name)
    }

    fn declare_local(&mut self, name: &str, type_id: TypeId) {
        self.ctx.env.declare(Export::new(name, type_id));
    }

    fn resolve_item(&mut self, item: &Item, module_name: &str) {
        match item {
            Item::Function(f) => self.resolve_function(f, module_name),
            Item::Struct(s) => {
                let type_id = self.ctx.types.reserve(&self.qualified(module_name, &s.name));
                self.type_param_scope.clear();
                for param in &s.type_params {
                    let placeholder = self.ctx.types.reserve(&format!("$typeparam.{}", param));
                    self.type_param_scope.insert(param.clone(), placeholder);
                }
                let mut offset = 0u32;
                let mut struct_align = 1u32;
                let mut contains_heap_refs = false;
                let mut fields = Vec::with_capacity(s.fields.len());
                for field in &s.fields {
                    let field_ty = self.resolve_type_expr(&field.ty);
                    let descriptor = self.ctx.types.descriptor(field_ty);
                    let (size, align) = descriptor
                        .as_ref()
                        .map(|d| (d.size, d.align.max(1)))
                        .unwrap_or((4, 4));
                    contains_heap_refs |= descriptor.map(|d| d.contains_heap_refs).unwrap_or(true);
                    struct_align = struct_align.max(align);
                    offset = round_up(offset, align);
                    fields.push(StructField {
                        name: self.ctx.interner.intern(&field.name),
                        ty: field_ty,
                        offset,
                    });
                    offset += size;
                }
                offset = round_up(offset, struct_align);
                self.ctx.types.define_struct(
                    type_id,
                    StructDef {
                        fields,
                        generic_param_count: s.type_params.len(),
                        is_value_type: true,
                    },
                );
                self.ctx.types.define(
                    type_id,
                    TypeDescriptor {
                        name: self.ctx.interner.intern(&self.qualified(module_name, &s.name)),
                        kind: TypeKind::Struct,
                        type_params: vec![],
                        size: offset,
                        align: struct_align,
                        contains_heap_refs,
                    },
                );
            }
            Item::Sum(s) => {
                let type_id = self.ctx.types.reserve(&self.qualified(module_name, &s.name));
                self.type_param_scope.clear();
                for param in &s.type_params {
                    let placeholder = self.ctx.types.reserve(&format!("$typeparam.{}", param));
                    self.type_param_scope.insert(param.clone(), placeholder);
                }
                let mut variants = Vec::with_capacity(s.variants.len());
                let mut contains_heap_refs = false;
                for variant in &s.variants {
                    let payload = self.resolve_variant_payload(variant.payload.as_deref());
                    if let Some(p) = payload {
                        contains_heap_refs |= self
                            .ctx
                            .types
                            .descriptor(p)
                            .map(|d| d.contains_heap_refs)
                            .unwrap_or(true);
                    }
                    variants.push(smalls_types::VariantDef {
                        name: self.ctx.interner.intern(&variant.name),
                        payload,
                    });
                }
                self.ctx.types.define_sum(
                    type_id,
                    SumDef {
                        variants,
                        generic_param_count: s.type_params.len(),
                    },
                );
                self.ctx.types.define(
                    type_id,
                    TypeDescriptor {
                        name: self.ctx.interner.intern(&self.qualified(module_name, &s.name)),
                        kind: TypeKind::Sum,
                        type_params: vec![],
                        size: 8,
                        align: 8,
                        contains_heap_refs,
                    },
                );
            }
            Item::TypeAlias(t) => {
                let type_id = self.ctx.types.reserve(&self.qualified(module_name, &t.name));
                let aliased = self.resolve_type_expr(&t.aliased);
                let descriptor = self.ctx.types.descriptor(aliased);
                self.ctx.types.define(
                    type_id,
                    TypeDescriptor {
                        name: self.ctx.interner.intern(&self.qualified(module_name, &t.name)),
                        kind: TypeKind::TypeAlias,
                        type_params: vec![TypeArg::Type(aliased)],
                        size: descriptor.as_ref().map(|d| d.size).unwrap_or(0),
                        align: descriptor.as_ref().map(|d| d.align).unwrap_or(1),
                        contains_heap_refs: descriptor.map(|d| d.contains_heap_refs).unwrap_or(false),
                    },
                );
            }
            Item::Newtype(t) => {
                let type_id = self.ctx.types.reserve(&self.qualified(module_name, &t.name));
                let underlying = self.resolve_type_expr(&t.underlying);
                let descriptor = self.ctx.types.descriptor(underlying);
                self.ctx.types.define(
                    type_id,
                    TypeDescriptor {
                        name: self.ctx.interner.intern(&self.qualified(module_name, &t.name)),
                        kind: TypeKind::Newtype,
                        type_params: vec![TypeArg::Type(underlying)],
                        size: descriptor.as_ref().map(|d| d.size).unwrap_or(0),
                        align: descriptor.as_ref().map(|d| d.align).unwrap_or(1),
                        contains_heap_refs: descriptor.map(|d| d.contains_heap_refs).unwrap_or(false),
                    },
                );
            }
            Item::Opaque(t) => {
                let type_id = self.ctx.types.reserve(&self.qualified(module_name, &t.name));
                self.ctx.types.define(
                    type_id,
                    TypeDescriptor {
                        name: self.ctx.interner.intern(&self.qualified(module_name, &t.name)),
                        kind: TypeKind::Opaque,
                        type_params: vec![],
                        size: 8,
                        align: 8,
                        contains_heap_refs: true,
                    },
                );
            }
            Item::Var(v) => {
                let ty = v
                    .ty
                    .as_ref()
                    .map(|t| self.resolve_type_expr(t))
                    .unwrap_or(TypeId::ANY);
                if v.is_const {
                    if let Some(init) = &v.init {
                        let evaluator = ConstEvaluator::new(&self.ctx.const_ints);
                        if let Some(value) = evaluator.eval(init) {
                            self.ctx.const_ints.insert(v.name.clone(), value);
                        }
                    }
                }
                let init_ty = v.init.as_ref().map(|e| self.resolve_expr_types(e, module_name));
                if let (true, Some(actual)) = (v.ty.is_some(), init_ty) {
                    if !self.ctx.types.is_type_convertible(ty, actual) {
                        self.ctx.error(
                            error_codes::TYPE_MISMATCH,
                            v.init.as_ref().map(|e| e.range()).unwrap_or(v.range),
                            format!("variable `{}` initializer has the wrong type", v.name),
                        );
                    }
                }
                let bound_ty = if v.ty.is_some() { ty } else { init_ty.unwrap_or(TypeId::ANY) };
                self.declare_local(&v.name, bound_ty);
            }
            Item::DeclList(list) => {
                for decl in &list.decls {
                    let ty = decl
                        .ty
                        .as_ref()
                        .map(|t| self.resolve_type_expr(t))
                        .unwrap_or(TypeId::ANY);
                    let init_ty = decl.init.as_ref().map(|e| self.resolve_expr_types(e, module_name));
                    if let (true, Some(actual)) = (decl.ty.is_some(), init_ty) {
                        if !self.ctx.types.is_type_convertible(ty, actual) {
                            self.ctx.error(
                                error_codes::TYPE_MISMATCH,
                                decl.init.as_ref().map(|e| e.range()).unwrap_or(decl.range),
                                format!("variable `{}` initializer has the wrong type", decl.name),
                            );
                        }
                    }
                    let bound_ty = if decl.ty.is_some() { ty } else { init_ty.unwrap_or(TypeId::ANY) };
                    self.declare_local(&decl.name, bound_ty);
                }
            }
        }
    }

    fn resolve_variant_payload(&mut self, payload: Option<&[FieldDecl]>) -> Option<TypeId> {
        let fields = payload?;
        if fields.is_empty() {
            return None;
        }
        if fields.len() == 1 {
            return Some(self.resolve_type_expr(&fields[0].ty));
        }
        let elems: Vec<TypeId> = fields.iter().map(|f| self.resolve_type_expr(&f.ty)).collect();
        Some(self.ctx.types.register_tuple_type(elems))
    }

    fn resolve_function(&mut self, f: &FunctionDecl, module_name: &str) {
        self.type_param_scope.clear();
        for param in &f.type_params {
            let placeholder = self.ctx.types.reserve(&format!("$typeparam.{}", param));
            self.type_param_scope.insert(param.clone(), placeholder);
        }

        let param_types: Vec<TypeId> = f.params.iter().map(|p| self.resolve_type_expr(&p.ty)).collect();
        let return_type = f
            .return_type
            .as_ref()
            .map(|t| self.resolve_type_expr(t))
            .unwrap_or(TypeId::VOID);

        let qualified = self.qualified(module_name, &f.name);
        self.ctx
            .function_sigs
            .insert(f.name.clone(), (param_types.clone(), return_type));
        self.ctx.function_sigs.insert(qualified, (param_types.clone(), return_type));

        if let Some(alias) = f.operator_alias {
            if let Some(&owner) = param_types.first() {
                self.ctx.types.register_operator_alias_info(owner, to_operator_kind(alias));
            }
        }

        if let Some(body) = &f.body {
            let outer_return_type = self.current_return_type.replace(return_type);
            self.ctx.env.begin_scope();
            for (param, ty) in f.params.iter().zip(param_types.iter()) {
                self.declare_local(&param.name, *ty);
            }
            for stmt in &body.statements {
                self.resolve_statement_types(stmt, module_name);
            }
            self.ctx.env.end_scope();
            self.current_return_type = outer_return_type;
        }
    }

    fn resolve_statement_types(&mut self, stmt: &Statement, module_name: &str) {
        match stmt {
            Statement::Block(b) => {
                self.ctx.env.begin_scope();
                for s in &b.statements {
                    self.resolve_statement_types(s, module_name);
                }
                self.ctx.env.end_scope();
            }
            Statement::If(s) => {
                self.resolve_expr_types(&s.condition, module_name);
                self.resolve_statement_types(&s.then_branch, module_name);
                if let Some(e) = &s.else_branch {
                    self.resolve_statement_types(e, module_name);
                }
            }
            Statement::For(s) => {
                self.ctx.env.begin_scope();
                if let Some(init) = &s.init {
                    self.resolve_statement_types(init, module_name);
                }
                if let Some(cond) = &s.condition {
                    self.resolve_expr_types(cond, module_name);
                }
                if let Some(inc) = &s.increment {
                    self.resolve_expr_types(inc, module_name);
                }
                self.resolve_statement_types(&s.body, module_name);
                self.ctx.env.end_scope();
            }
            Statement::ForEach(s) => {
                let iterable_ty = self.resolve_expr_types(&s.iterable, module_name);
                let elem_ty = self.element_type_of(iterable_ty);
                self.ctx.env.begin_scope();
                self.declare_local(&s.binding, elem_ty);
                self.resolve_statement_types(&s.body, module_name);
                self.ctx.env.end_scope();
            }
            Statement::Switch(s) => {
                self.resolve_expr_types(&s.scrutinee, module_name);
                let sum_type = self.scrutinee_sum_type(s);
                for case in &s.cases {
                    self.ctx.env.begin_scope();
                    match &case.label {
                        SwitchLabel::Variant { variant_name, bindings } => {
                            self.bind_variant_payload(sum_type, variant_name, bindings);
                        }
                        SwitchLabel::Literal(exprs) => {
                            for e in exprs {
                                self.resolve_expr_types(e, module_name);
                            }
                        }
                    }
                    for stmt in &case.body.statements {
                        self.resolve_statement_types(stmt, module_name);
                    }
                    self.ctx.env.end_scope();
                }
                if let Some(default) = &s.default {
                    self.ctx.env.begin_scope();
                    for stmt in &default.statements {
                        self.resolve_statement_types(stmt, module_name);
                    }
                    self.ctx.env.end_scope();
                }
            }
            Statement::Jump(JumpStatement::Return { value: Some(expr), range }) => {
                let actual = self.resolve_expr_types(expr, module_name);
                if let Some(expected) = self.current_return_type {
                    if expected != TypeId::VOID && !self.ctx.types.is_type_convertible(expected, actual) {
                        self.ctx.error(error_codes::TYPE_MISMATCH, *range, "returned value has the wrong type");
                    }
                }
            }
            Statement::Decl(item) => self.resolve_item(item, module_name),
            Statement::Expr(e) => {
                self.resolve_expr_types(&e.expr, module_name);
            }
            Statement::Jump(_) | Statement::Empty(_) => {}
        }
    }

    fn scrutinee_sum_type(&self, s: &SwitchStatement) -> Option<TypeId> {
        if let Expression::Identifier { name, .. } = &s.scrutinee {
            let type_id = self.ctx.env.resolve(name)?.type_id;
            if self.ctx.types.kind_of(type_id) == Some(TypeKind::Sum) {
                return Some(type_id);
            }
        }
        None
    }

    /// Binds a `case Variant(a, b):` label's names to the variant's payload
    /// element types -- a tuple payload binds positionally, a single-field
    /// payload binds its one name, and a unit variant's bindings (if any
    /// were still written) fall back to `any`.
    fn bind_variant_payload(&mut self, sum_type: Option<TypeId>, variant_name: &str, bindings: &[String]) {
        if bindings.is_empty() {
            return;
        }
        let payload = sum_type.and_then(|t| self.ctx.types.sum_def(t)).and_then(|def| {
            def.variants
                .iter()
                .find(|v| v.name.as_str() == variant_name)
                .and_then(|v| v.payload)
        });
        match payload {
            Some(payload_ty) if self.ctx.types.kind_of(payload_ty) == Some(TypeKind::Tuple) => {
                let elem_types: Vec<TypeId> = self
                    .ctx
                    .types
                    .descriptor(payload_ty)
                    .map(|d| {
                        d.type_params
                            .iter()
                            .filter_map(|p| match p {
                                TypeArg::Type(t) => Some(*t),
                                TypeArg::Size(_) => None,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                for (name, ty) in bindings.iter().zip(elem_types.iter()) {
                    self.declare_local(name, *ty);
                }
                for name in bindings.iter().skip(elem_types.len()) {
                    self.declare_local(name, TypeId::ANY);
                }
            }
            Some(payload_ty) => {
                self.declare_local(&bindings[0], payload_ty);
                for name in bindings.iter().skip(1) {
                    self.declare_local(name, TypeId::ANY);
                }
            }
            None => {
                for name in bindings {
                    self.declare_local(name, TypeId::ANY);
                }
            }
        }
    }

    fn element_type_of(&self, container: TypeId) -> TypeId {
        match self.ctx.types.descriptor(container) {
            Some(d) if matches!(d.kind, TypeKind::Array | TypeKind::FixedArray) => match d.type_params.first() {
                Some(TypeArg::Type(t)) => *t,
                _ => TypeId::ANY,
            },
            Some(d) if d.kind == TypeKind::Map => match d.type_params.get(1) {
                Some(TypeArg::Type(t)) => *t,
                _ => TypeId::ANY,
            },
            _ => TypeId::ANY,
        }
    }

    /// Climbs the lambda stack and records `name` as a capture of every
    /// lambda whose own base scope lies deeper than `declared_depth` --
    /// i.e. every lambda the declaration genuinely sits outside of. The
    /// outermost such lambda captures directly from the enclosing function;
    /// any lambda nested inside that one receives the name as an upvalue
    /// forwarded through its parent.
    fn record_capture_if_needed(&mut self, name: &str, declared_depth: usize) {
        if declared_depth == 0 || self.lambda_stack.is_empty() {
            return;
        }
        let crossed: Vec<SourceRange> = self
            .lambda_stack
            .iter()
            .filter(|frame| frame.base_depth > declared_depth)
            .map(|frame| frame.range)
            .collect();
        for (i, range) in crossed.iter().enumerate() {
            self.ctx.record_lambda_capture(
                *range,
                CaptureInfo {
                    name: name.to_string(),
                    declaring_depth: declared_depth,
                    is_upvalue_of_parent: i > 0,
                },
            );
        }
    }

    fn resolve_lambda(&mut self, l: &LambdaExpr, module_name: &str) -> TypeId {
        let declared_return = l.return_type.as_ref().map(|t| self.resolve_type_expr(t));
        self.ctx.env.begin_scope();
        let base_depth = self.ctx.env.depth() - 1;
        self.lambda_stack.push(LambdaFrame { base_depth, range: l.range });
        let param_types: Vec<TypeId> = l
            .params
            .iter()
            .map(|p| {
                let ty = self.resolve_type_expr(&p.ty);
                self.declare_local(&p.name, ty);
                ty
            })
            .collect();
        let body_type = match &l.body {
            LambdaBody::Expr(e) => self.resolve_expr_types(e, module_name),
            LambdaBody::Block(b) => {
                for stmt in &b.statements {
                    self.resolve_statement_types(stmt, module_name);
                }
                TypeId::VOID
            }
        };
        self.lambda_stack.pop();
        self.ctx.env.end_scope();
        let return_type = declared_return.unwrap_or(body_type);
        self.ctx.types.register_function_type(param_types, return_type)
    }

    /// Resolves a call expression's result type. When the callee names a
    /// generic function, unifies its declared (placeholder) parameter types
    /// against the actual argument types to solve for each type parameter
    /// (`id(42)` solves `$T = int`; a later conflicting argument for the
    /// same parameter is a generic-inference failure).
    fn resolve_call(&mut self, callee: &Expression, args: &[Expression], range: SourceRange, module_name: &str) -> TypeId {
        let arg_types: Vec<TypeId> = args.iter().map(|a| self.resolve_expr_types(a, module_name)).collect();
        if let Expression::Identifier { name, .. } = callee {
            if let Some((param_types, return_type)) = self.ctx.function_sigs.get(name).cloned() {
                return self.resolve_generic_call(name, &param_types, return_type, &arg_types, range);
            }
            let suggestions = self.ctx.suggest_names(name);
            self.ctx.error(
                error_codes::UNDEFINED_NAME,
                range,
                format!("cannot find function `{}`{}", name, suggestion_suffix(&suggestions)),
            );
            return TypeId::ANY;
        }
        let callee_ty = self.resolve_expr_types(callee, module_name);
        match self.ctx.types.descriptor(callee_ty) {
            Some(d) if d.kind == TypeKind::Function => match d.type_params.last() {
                Some(TypeArg::Type(ret)) => *ret,
                _ => TypeId::ANY,
            },
            _ => TypeId::ANY,
        }
    }

    fn resolve_generic_call(
        &mut self,
        name: &str,
        param_types: &[TypeId],
        return_type: TypeId,
        arg_types: &[TypeId],
        range: SourceRange,
    ) -> TypeId {
        if param_types.len() != arg_types.len() {
            self.ctx.error(
                error_codes::ARGUMENT_COUNT,
                range,
                format!("`{}` expects {} argument(s), found {}", name, param_types.len(), arg_types.len()),
            );
            return return_type;
        }
        let mut bindings: HashMap<TypeId, TypeId> = HashMap::new();
        for (param_ty, arg_ty) in param_types.iter().zip(arg_types.iter()) {
            if self.ctx.types.descriptor(*param_ty).is_none() {
                match bindings.get(param_ty) {
                    None => {
                        bindings.insert(*param_ty, *arg_ty);
                    }
                    Some(bound) if *bound != *arg_ty => {
                        self.ctx.error(
                            error_codes::GENERIC_INFERENCE_FAILED,
                            range,
                            format!("cannot infer a single type for `{}`'s type parameter: conflicting argument types", name),
                        );
                    }
                    _ => {}
                }
            } else if !self.ctx.types.is_type_convertible(*param_ty, *arg_ty) {
                self.ctx.error(
                    error_codes::TYPE_MISMATCH,
                    range,
                    format!("argument to `{}` has the wrong type", name),
                );
            }
        }
        if self.ctx.types.descriptor(return_type).is_none() {
            return bindings.get(&return_type).copied().unwrap_or(return_type);
        }
        return_type
    }

    /// Resolves a brace initializer's target type and checks the form it
    /// uses (positional / named / key-value) against what that type's kind
    /// actually accepts: structs take a positional or named form, fixed
    /// arrays only a positional form, maps only a key-value form. Using any
    /// other form for a target is reported as a type mismatch.
    fn resolve_brace_init(&mut self, type_name: &Option<String>, fields: &BraceInitFields, range: SourceRange, module_name: &str) -> TypeId {
        let target = match type_name {
            Some(name) => match self.ctx.resolve_type_by_name(name) {
                Some(id) => id,
                None => {
                    let suggestions = self.ctx.suggest_names(name);
                    self.ctx.error(
                        error_codes::UNDEFINED_TYPE,
                        range,
                        format!("cannot find type `{}`{}", name, suggestion_suffix(&suggestions)),
                    );
                    return TypeId::INVALID;
                }
            },
            None => TypeId::ANY_MAP,
        };
        let kind = self.ctx.types.kind_of(target);
        match (kind, fields) {
            (Some(TypeKind::Struct), BraceInitFields::Positional(elems)) => {
                if let Some(def) = self.ctx.types.struct_def(target) {
                    if def.fields.len() != elems.len() {
                        self.ctx.error(
                            error_codes::ARGUMENT_COUNT,
                            range,
                            format!("struct initializer has {} field(s), expected {}", elems.len(), def.fields.len()),
                        );
                    }
                    for (field, value) in def.fields.iter().zip(elems.iter()) {
                        let value_ty = self.resolve_expr_types(value, module_name);
                        if !self.ctx.types.is_type_convertible(field.ty, value_ty) {
                            self.ctx.error(
                                error_codes::TYPE_MISMATCH,
                                value.range(),
                                format!("field `{}` has the wrong type", field.name),
                            );
                        }
                    }
                    for extra in elems.iter().skip(def.fields.len()) {
                        self.resolve_expr_types(extra, module_name);
                    }
                }
            }
            (Some(TypeKind::Struct), BraceInitFields::Named(entries)) => {
                if let Some(def) = self.ctx.types.struct_def(target) {
                    for (name, value) in entries {
                        let value_ty = self.resolve_expr_types(value, module_name);
                        match def.fields.iter().find(|f| f.name.as_str() == name.as_str()) {
                            Some(field) => {
                                if !self.ctx.types.is_type_convertible(field.ty, value_ty) {
                                    self.ctx.error(
                                        error_codes::TYPE_MISMATCH,
                                        value.range(),
                                        format!("field `{}` has the wrong type", name),
                                    );
                                }
                            }
                            None => {
                                self.ctx.error(
                                    error_codes::UNDEFINED_NAME,
                                    value.range(),
                                    format!("struct has no field `{}`", name),
                                );
                            }
                        }
                    }
                }
            }
            (Some(TypeKind::Struct), BraceInitFields::KeyValue(entries)) => {
                self.ctx.error(
                    error_codes::TYPE_MISMATCH,
                    range,
                    "struct initializers accept a positional or named form, not key-value pairs",
                );
                for (k, v) in entries {
                    self.resolve_expr_types(k, module_name);
                    self.resolve_expr_types(v, module_name);
                }
            }
            (Some(TypeKind::FixedArray), BraceInitFields::Positional(elems)) => {
                let elem_ty = self.element_type_of(target);
                for e in elems {
                    let value_ty = self.resolve_expr_types(e, module_name);
                    if !self.ctx.types.is_type_convertible(elem_ty, value_ty) {
                        self.ctx.error(error_codes::TYPE_MISMATCH, e.range(), "array element has the wrong type");
                    }
                }
            }
            (Some(TypeKind::FixedArray), _) => {
                self.ctx.error(
                    error_codes::TYPE_MISMATCH,
                    range,
                    "fixed-array initializers only accept a positional form",
                );
            }
            (Some(TypeKind::Map) | Some(TypeKind::AnyMap), BraceInitFields::KeyValue(entries)) => {
                for (k, v) in entries {
                    self.resolve_expr_types(k, module_name);
                    self.resolve_expr_types(v, module_name);
                }
            }
            (Some(TypeKind::Map) | Some(TypeKind::AnyMap), _) => {
                self.ctx.error(error_codes::TYPE_MISMATCH, range, "map initializers only accept a key-value form");
            }
            _ => match fields {
                BraceInitFields::Positional(elems) => {
                    for e in elems {
                        self.resolve_expr_types(e, module_name);
                    }
                }
                BraceInitFields::Named(entries) => {
                    for (_, e) in entries {
                        self.resolve_expr_types(e, module_name);
                    }
                }
                BraceInitFields::KeyValue(entries) => {
                    for (k, v) in entries {
                        self.resolve_expr_types(k, module_name);
                        self.resolve_expr_types(v, module_name);
                    }
                }
            },
        }
        target
    }

    fn literal_type(&mut self, lit: &LiteralExpr, module_name: &str) -> TypeId {
        match lit {
            LiteralExpr::Int(_) => TypeId::INT,
            LiteralExpr::Float(_) => TypeId::FLOAT,
            LiteralExpr::Bool(_) => TypeId::BOOL,
            LiteralExpr::String(_) => TypeId::STRING,
            LiteralExpr::Array(elems) => {
                let elem_ty = elems
                    .first()
                    .map(|e| self.resolve_expr_types(e, module_name))
                    .unwrap_or(TypeId::ANY);
                for e in elems.iter().skip(1) {
                    self.resolve_expr_types(e, module_name);
                }
                self.ctx.types.register_compound(TypeKind::Array, vec![TypeArg::Type(elem_ty)])
            }
        }
    }

    /// Resolves an expression's type as the bodies pass walks it, along the
    /// way recording generic-call inference, brace-init form checks,
    /// pattern-switch bindings (via `resolve_statement_types`'s `Switch`
    /// arm) and lambda captures. Anything that depends on information this
    /// pass doesn't track falls back to `any` rather than bailing out.
    fn resolve_expr_types(&mut self, expr: &Expression, module_name: &str) -> TypeId {
        match expr {
            Expression::Literal(lit, _) => self.literal_type(lit, module_name),
            Expression::Identifier { name, .. } => {
                let Some((export, declared_depth)) = self.ctx.env.resolve_with_depth(name) else {
                    return TypeId::ANY;
                };
                let type_id = export.type_id;
                self.record_capture_if_needed(name, declared_depth);
                type_id
            }
            Expression::Path { .. } => TypeId::ANY,
            Expression::Assign { target, value, .. } => {
                self.resolve_expr_types(target, module_name);
                self.resolve_expr_types(value, module_name)
            }
            Expression::Binary { lhs, rhs, .. } => {
                let lhs_ty = self.resolve_expr_types(lhs, module_name);
                self.resolve_expr_types(rhs, module_name);
                lhs_ty
            }
            Expression::Comparison { lhs, rhs, .. } => {
                self.resolve_expr_types(lhs, module_name);
                self.resolve_expr_types(rhs, module_name);
                TypeId::BOOL
            }
            Expression::Logical { lhs, rhs, .. } => {
                self.resolve_expr_types(lhs, module_name);
                self.resolve_expr_types(rhs, module_name);
                TypeId::BOOL
            }
            Expression::Unary { operand, .. } => self.resolve_expr_types(operand, module_name),
            Expression::Conditional { condition, then_expr, else_expr, .. } => {
                self.resolve_expr_types(condition, module_name);
                let then_ty = self.resolve_expr_types(then_expr, module_name);
                self.resolve_expr_types(else_expr, module_name);
                then_ty
            }
            Expression::Call { callee, args, range } => self.resolve_call(callee, args, *range, module_name),
            Expression::Index { target, index, .. } => {
                let target_ty = self.resolve_expr_types(target, module_name);
                self.resolve_expr_types(index, module_name);
                self.element_type_of(target_ty)
            }
            Expression::Cast { expr, target_type, .. } => {
                self.resolve_expr_types(expr, module_name);
                self.resolve_type_expr(target_type)
            }
            Expression::Grouping { inner, .. } => self.resolve_expr_types(inner, module_name),
            Expression::Tuple { elements, .. } => {
                let elems: Vec<TypeId> = elements.iter().map(|e| self.resolve_expr_types(e, module_name)).collect();
                self.ctx.types.register_tuple_type(elems)
            }
            Expression::BraceInit { type_name, fields, range } => {
                self.resolve_brace_init(type_name, fields, *range, module_name)
            }
            Expression::Lambda(l) => self.resolve_lambda(l, module_name),
            Expression::FString { parts, .. } => {
                for part in parts {
                    if let FStringPart::Expr(e) = part {
                        self.resolve_expr_types(e, module_name);
                    }
                }
                TypeId::STRING
            }
            Expression::Empty(_) => TypeId::VOID,
        }
    }

    pub fn resolve_type_expr(&mut self, texpr: &TypeExpr) -> TypeId {
        match texpr {
            TypeExpr::Named { name, args, range } => {
                if args.is_empty() {
                    if let Some(&placeholder) = self.type_param_scope.get(name) {
                        return placeholder;
                    }
                    match self.ctx.resolve_type_by_name(name) {
                        Some(id) => id,
                        None => {
                            let range = *range;
                            let suggestions = self.ctx.suggest_names(name);
                            self.ctx.error(
                                error_codes::UNDEFINED_TYPE,
                                range,
                                format!("cannot find type `{}`{}", name, suggestion_suffix(&suggestions)),
                            );
                            TypeId::INVALID
                        }
                    }
                } else {
                    let generic_id = match self.ctx.resolve_type_by_name(name) {
                        Some(id) => id,
                        None => {
                            let range = *range;
                            self.ctx
                                .error(error_codes::UNDEFINED_TYPE, range, format!("cannot find type `{}`", name));
                            return TypeId::INVALID;
                        }
                    };
                    let resolved_args: Vec<TypeId> = args.iter().map(|a| self.resolve_type_expr(a)).collect();
                    if !self.ctx.check_type_instantiation_limit(*range) {
                        return TypeId::INVALID;
                    }
                    let type_args: Vec<TypeArg> = resolved_args.iter().copied().map(TypeArg::Type).collect();
                    let base_name = name.clone();
                    let contains_heap_refs = resolved_args
                        .iter()
                        .any(|id| self.ctx.types.descriptor(*id).map(|d| d.contains_heap_refs).unwrap_or(true));
                    let interner = self.ctx.interner.clone();
                    self.ctx.types.get_or_instantiate(generic_id, type_args.clone(), || TypeDescriptor {
                        name: interner.intern(&format!("{}<{:?}>", base_name, resolved_args)),
                        kind: TypeKind::Struct,
                        type_params: type_args,
                        size: 8,
                        align: 8,
                        contains_heap_refs,
                    })
                }
            }
            TypeExpr::TypeParam { name, .. } => self
                .type_param_scope
                .get(name)
                .copied()
                .unwrap_or(TypeId::ANY),
            TypeExpr::Tuple { elements, .. } => {
                let elems: Vec<TypeId> = elements.iter().map(|e| self.resolve_type_expr(e)).collect();
                self.ctx.types.register_tuple_type(elems)
            }
            TypeExpr::Array { element, size, .. } => {
                let elem = self.resolve_type_expr(element);
                match size {
                    Some(size_expr) => {
                        let evaluator = ConstEvaluator::new(&self.ctx.const_ints);
                        match evaluator.eval(size_expr) {
                            Some(n) if n >= 0 => self
                                .ctx
                                .types
                                .register_compound(TypeKind::FixedArray, vec![TypeArg::Type(elem), TypeArg::Size(n as u64)]),
                            _ => {
                                self.ctx.error(
                                    error_codes::INVALID_CAST,
                                    size_expr.range(),
                                    "array size must be a non-negative constant integer",
                                );
                                TypeId::INVALID
                            }
                        }
                    }
                    None => self.ctx.types.register_compound(TypeKind::Array, vec![TypeArg::Type(elem)]),
                }
            }
            TypeExpr::Map { key, value, .. } => {
                let k = self.resolve_type_expr(key);
                let v = self.resolve_type_expr(value);
                self.ctx
                    .types
                    .register_compound(TypeKind::Map, vec![TypeArg::Type(k), TypeArg::Type(v)])
            }
            TypeExpr::Function { params, ret, .. } => {
                let param_ids: Vec<TypeId> = params.iter().map(|p| self.resolve_type_expr(p)).collect();
                let ret_id = self.resolve_type_expr(ret);
                self.ctx.types.register_function_type(param_ids, ret_id)
            }
            TypeExpr::Optional { inner, range } => {
                let inner_id = self.resolve_type_expr(inner);
                let option_id = *self.option_type_id.get_or_insert_with(|| {
                    self.ctx.types.reserve("core.Option")
                });
                if !self.ctx.check_type_instantiation_limit(*range) {
                    return TypeId::INVALID;
                }
                let interner = self.ctx.interner.clone();
                self.ctx.types.get_or_instantiate(option_id, vec![TypeArg::Type(inner_id)], || TypeDescriptor {
                    name: interner.intern("core.Option<T>"),
                    kind: TypeKind::Sum,
                    type_params: vec![TypeArg::Type(inner_id)],
                    size: 8,
                    align: 8,
                    contains_heap_refs: true,
                })
            }
        }
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    let align = align.max(1);
    (value + align - 1) & !(align - 1)
}

fn suggestion_suffix(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean `{}`?)", suggestions.join("`, `"))
    }
}

fn to_operator_kind(alias: OperatorAlias) -> OperatorKind {
    match alias {
        OperatorAlias::Add => OperatorKind::Plus,
        OperatorAlias::Sub => OperatorKind::Minus,
        OperatorAlias::Mul => OperatorKind::Times,
        OperatorAlias::Div => OperatorKind::Div,
        OperatorAlias::Eq | OperatorAlias::NotEq => OperatorKind::Eq,
        OperatorAlias::Lt | OperatorAlias::LtEq | OperatorAlias::Gt | OperatorAlias::GtEq => OperatorKind::Lt,
        OperatorAlias::Hash => OperatorKind::Hash,
        OperatorAlias::Mod | OperatorAlias::Neg | OperatorAlias::Not => OperatorKind::Plus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smalls_ast::{BinaryOp, Expression, LiteralExpr, Param, StructDecl, VarDecl};
    use smalls_diagnostics::{DiagnosticSink, Limits, SourceRange};
    use smalls_types::{StringInterner, VariantDef};
    use smalls_types::TypeRegistry;
    use std::sync::Arc;

    struct NullSink;
    impl DiagnosticSink for NullSink {
        fn lexical_diagnostic(&mut self, _s: &str, _m: &str, _w: bool, _r: SourceRange) {}
        fn parse_diagnostic(&mut self, _s: &str, _m: &str, _w: bool, _r: SourceRange) {}
        fn semantic_diagnostic(&mut self, _s: &str, _m: &str, _w: bool, _r: SourceRange) {}
    }

    fn r() -> SourceRange {
        SourceRange::unknown()
    }

    fn fresh_ctx(sink: &mut NullSink) -> ResolutionContext<'_> {
        let interner = Arc::new(StringInterner::new());
        let types = Arc::new(TypeRegistry::new(interner.clone()));
        ResolutionContext::new("m", interner, types, Limits::default(), sink)
    }

    #[test]
    fn struct_field_offsets_accumulate() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let decl = StructDecl {
            name: "Point".to_string(),
            type_params: vec![],
            fields: vec![
                FieldDecl { name: "x".to_string(), ty: TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() }, default: None, range: r() },
                FieldDecl { name: "y".to_string(), ty: TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() }, default: None, range: r() },
            ],
            range: r(),
        };
        let mut resolver = TypeResolver::new(&mut ctx);
        resolver.resolve_item(&Item::Struct(decl), "m");
        let type_id = ctx.types.type_id("m.Point").unwrap();
        let def = ctx.types.struct_def(type_id).unwrap();
        assert_eq!(def.fields.len(), 2);
        assert_eq!(def.fields[0].offset, 0);
        assert_eq!(def.fields[1].offset, 8);
    }

    #[test]
    fn fixed_array_size_comes_from_const_eval() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        ctx.const_ints.insert("N".to_string(), 4);
        let mut resolver = TypeResolver::new(&mut ctx);
        let texpr = TypeExpr::Array {
            element: Box::new(TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() }),
            size: Some(Box::new(Expression::Identifier { name: "N".to_string(), range: r() })),
            range: r(),
        };
        let id = resolver.resolve_type_expr(&texpr);
        assert_ne!(id, TypeId::INVALID);
        assert_eq!(ctx.types.kind_of(id), Some(TypeKind::FixedArray));
    }

    #[test]
    fn unknown_type_name_is_reported() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let mut resolver = TypeResolver::new(&mut ctx);
        let texpr = TypeExpr::Named { name: "Bogus".to_string(), args: vec![], range: r() };
        let id = resolver.resolve_type_expr(&texpr);
        assert_eq!(id, TypeId::INVALID);
        assert!(ctx.has_errors());
    }

    #[test]
    fn const_var_value_is_folded_into_const_ints() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let var = Item::Var(VarDecl {
            name: "SIZE".to_string(),
            ty: None,
            init: Some(Expression::Literal(LiteralExpr::Int(16), r())),
            is_const: true,
            range: r(),
        });
        TypeResolver::new(&mut ctx).resolve_item(&var, "m");
        assert_eq!(ctx.const_ints.get("SIZE"), Some(&16));
    }

    #[test]
    fn function_signature_is_recorded() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let f = FunctionDecl {
            name: "add".to_string(),
            type_params: vec![],
            params: vec![
                Param { name: "a".to_string(), ty: TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() }, range: r() },
                Param { name: "b".to_string(), ty: TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() }, range: r() },
            ],
            return_type: Some(TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() }),
            body: None,
            is_native: false,
            is_intrinsic: false,
            operator_alias: None,
            range: r(),
        };
        TypeResolver::new(&mut ctx).resolve_function(&f, "m");
        let (params, ret) = ctx.function_sigs.get("add").unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(*ret, TypeId::INT);
    }

    #[test]
    fn pattern_switch_binds_variant_payload_type() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let sum_id = ctx.types.reserve("m.Option");
        ctx.types.define_sum(
            sum_id,
            SumDef {
                variants: vec![
                    VariantDef { name: ctx.interner.intern("some"), payload: Some(TypeId::INT) },
                    VariantDef { name: ctx.interner.intern("none"), payload: None },
                ],
                generic_param_count: 0,
            },
        );
        let mut resolver = TypeResolver::new(&mut ctx);
        resolver.bind_variant_payload(Some(sum_id), "some", &["v".to_string()]);
        drop(resolver);
        assert_eq!(ctx.env.resolve("v").unwrap().type_id, TypeId::INT);
    }

    #[test]
    fn generic_call_infers_type_parameter_from_argument() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let f = FunctionDecl {
            name: "id".to_string(),
            type_params: vec!["T".to_string()],
            params: vec![Param {
                name: "x".to_string(),
                ty: TypeExpr::TypeParam { name: "T".to_string(), range: r() },
                range: r(),
            }],
            return_type: Some(TypeExpr::TypeParam { name: "T".to_string(), range: r() }),
            body: None,
            is_native: false,
            is_intrinsic: false,
            operator_alias: None,
            range: r(),
        };
        let mut resolver = TypeResolver::new(&mut ctx);
        resolver.resolve_function(&f, "m");
        let call = Expression::Call {
            callee: Box::new(Expression::Identifier { name: "id".to_string(), range: r() }),
            args: vec![Expression::Literal(LiteralExpr::Int(42), r())],
            range: r(),
        };
        let result_ty = resolver.resolve_expr_types(&call, "m");
        drop(resolver);
        assert_eq!(result_ty, TypeId::INT);
        assert!(!ctx.has_errors());
    }

    #[test]
    fn generic_call_with_conflicting_argument_types_is_an_inference_failure() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let f = FunctionDecl {
            name: "pair".to_string(),
            type_params: vec!["T".to_string()],
            params: vec![
                Param { name: "a".to_string(), ty: TypeExpr::TypeParam { name: "T".to_string(), range: r() }, range: r() },
                Param { name: "b".to_string(), ty: TypeExpr::TypeParam { name: "T".to_string(), range: r() }, range: r() },
            ],
            return_type: Some(TypeExpr::TypeParam { name: "T".to_string(), range: r() }),
            body: None,
            is_native: false,
            is_intrinsic: false,
            operator_alias: None,
            range: r(),
        };
        let mut resolver = TypeResolver::new(&mut ctx);
        resolver.resolve_function(&f, "m");
        let call = Expression::Call {
            callee: Box::new(Expression::Identifier { name: "pair".to_string(), range: r() }),
            args: vec![
                Expression::Literal(LiteralExpr::Int(1), r()),
                Expression::Literal(LiteralExpr::Float(1.5), r()),
            ],
            range: r(),
        };
        resolver.resolve_expr_types(&call, "m");
        drop(resolver);
        assert!(ctx.has_errors());
    }

    #[test]
    fn brace_init_struct_accepts_positional_and_named_forms() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let decl = StructDecl {
            name: "T".to_string(),
            type_params: vec![],
            fields: vec![
                FieldDecl { name: "x".to_string(), ty: TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() }, default: None, range: r() },
                FieldDecl { name: "y".to_string(), ty: TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() }, default: None, range: r() },
            ],
            range: r(),
        };
        let mut resolver = TypeResolver::new(&mut ctx);
        resolver.resolve_item(&Item::Struct(decl), "m");

        let positional = Expression::BraceInit {
            type_name: Some("T".to_string()),
            fields: BraceInitFields::Positional(vec![
                Expression::Literal(LiteralExpr::Int(3), r()),
                Expression::Literal(LiteralExpr::Int(4), r()),
            ]),
            range: r(),
        };
        resolver.resolve_expr_types(&positional, "m");

        let named = Expression::BraceInit {
            type_name: Some("T".to_string()),
            fields: BraceInitFields::Named(vec![
                ("x".to_string(), Expression::Literal(LiteralExpr::Int(1), r())),
                ("y".to_string(), Expression::Literal(LiteralExpr::Int(2), r())),
            ]),
            range: r(),
        };
        resolver.resolve_expr_types(&named, "m");
        drop(resolver);
        assert!(!ctx.has_errors());
    }

    #[test]
    fn brace_init_struct_rejects_key_value_form() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let decl = StructDecl {
            name: "T".to_string(),
            type_params: vec![],
            fields: vec![FieldDecl {
                name: "x".to_string(),
                ty: TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() },
                default: None,
                range: r(),
            }],
            range: r(),
        };
        let mut resolver = TypeResolver::new(&mut ctx);
        resolver.resolve_item(&Item::Struct(decl), "m");

        let mixed = Expression::BraceInit {
            type_name: Some("T".to_string()),
            fields: BraceInitFields::KeyValue(vec![(
                Expression::Literal(LiteralExpr::String("x".to_string()), r()),
                Expression::Literal(LiteralExpr::Int(1), r()),
            )]),
            range: r(),
        };
        resolver.resolve_expr_types(&mixed, "m");
        drop(resolver);
        assert!(ctx.has_errors());
    }

    #[test]
    fn lambda_capture_records_declaring_depth() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        ctx.env.begin_scope();
        ctx.env.declare(Export::new("n", TypeId::INT));

        let lambda = LambdaExpr {
            params: vec![Param {
                name: "x".to_string(),
                ty: TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() },
                range: r(),
            }],
            return_type: Some(TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() }),
            body: LambdaBody::Expr(Box::new(Expression::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(Expression::Identifier { name: "x".to_string(), range: r() }),
                rhs: Box::new(Expression::Identifier { name: "n".to_string(), range: r() }),
                range: r(),
            })),
            range: r(),
        };
        let mut resolver = TypeResolver::new(&mut ctx);
        resolver.resolve_lambda(&lambda, "m");
        drop(resolver);

        let captures = ctx.lambda_captures(lambda.range);
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].name, "n");
        assert_eq!(captures[0].declaring_depth, 1);
        assert!(!captures[0].is_upvalue_of_parent);
    }

    #[test]
    fn nested_lambda_marks_forwarded_capture_as_upvalue() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        ctx.env.begin_scope();
        ctx.env.declare(Export::new("n", TypeId::INT));

        let inner = LambdaExpr {
            params: vec![],
            return_type: Some(TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() }),
            body: LambdaBody::Expr(Box::new(Expression::Identifier { name: "n".to_string(), range: r() })),
            range: SourceRange::point(1, 1),
        };
        let inner_range = inner.range;
        let outer = LambdaExpr {
            params: vec![],
            return_type: None,
            body: LambdaBody::Expr(Box::new(Expression::Lambda(inner))),
            range: SourceRange::point(2, 2),
        };
        let outer_range = outer.range;
        let mut resolver = TypeResolver::new(&mut ctx);
        resolver.resolve_lambda(&outer, "m");
        drop(resolver);

        assert_eq!(ctx.lambda_captures(outer_range).len(), 1);
        assert!(!ctx.lambda_captures(outer_range)[0].is_upvalue_of_parent);
        assert_eq!(ctx.lambda_captures(inner_range).len(), 1);
        assert!(ctx.lambda_captures(inner_range)[0].is_upvalue_of_parent);
    }
}
