//! Native code target setup and whole-expression compilation.

use crate::access::DataType;
use crate::codegen::compiled::{CompiledExpression, CompiledFn};
use crate::codegen::emitter::{ir_type, FunctionEmitter};
use crate::expression::{Expression, ExpressionError, ExpressionResult};
use cranelift_codegen::ir::{types, AbiParam};
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Linkage, Module};
use log::{debug, trace};
use std::sync::atomic::{AtomicU64, Ordering};

/// Optimization level handed to the code generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Code generation configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodegenConfig {
    pub opt_level: OptLevel,
    /// Run the IR verifier on every function
    pub verify: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::Speed,
            verify: cfg!(debug_assertions),
        }
    }
}

fn setup_error(e: impl ToString) -> ExpressionError {
    ExpressionError::CodegenSetup(e.to_string())
}

fn codegen_error(e: impl ToString) -> ExpressionError {
    ExpressionError::Codegen(e.to_string())
}

/// Compiles expression trees to native functions for the host.
///
/// Each compiled expression gets its own code module, so expressions are
/// released independently of each other and of the backend.
pub struct CodegenBackend {
    isa: OwnedTargetIsa,
    config: CodegenConfig,
    next_function: AtomicU64,
}

impl CodegenBackend {
    pub fn new() -> ExpressionResult<Self> {
        Self::with_config(CodegenConfig::default())
    }

    pub fn with_config(config: CodegenConfig) -> ExpressionResult<Self> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", config.opt_level.as_setting())
            .map_err(setup_error)?;
        flag_builder.set("is_pic", "false").map_err(setup_error)?;
        flag_builder
            .set("enable_verifier", if config.verify { "true" } else { "false" })
            .map_err(setup_error)?;

        let isa_builder = cranelift_native::builder().map_err(setup_error)?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(setup_error)?;
        debug!(
            "codegen backend for {} with {:?}",
            isa.triple(),
            config
        );

        Ok(Self {
            isa,
            config,
            next_function: AtomicU64::new(0),
        })
    }

    /// Compile `expr` at its declared result type
    pub fn compile(&self, expr: &Expression) -> ExpressionResult<CompiledExpression> {
        let result_type =
            expr.result_type()
                .ok_or_else(|| ExpressionError::UnsupportedTypeForCodegen {
                    data_type: None,
                    context: expr.to_string(),
                })?;
        self.compile_as(expr, result_type)
    }

    /// Compile `expr` producing a value of `result_type`
    pub fn compile_as(
        &self,
        expr: &Expression,
        result_type: DataType,
    ) -> ExpressionResult<CompiledExpression> {
        if ir_type(result_type).is_none() {
            return Err(ExpressionError::UnsupportedTypeForCodegen {
                data_type: Some(result_type),
                context: expr.to_string(),
            });
        }

        let name = format!(
            "expr_{}",
            self.next_function.fetch_add(1, Ordering::Relaxed)
        );
        debug!("compiling {} as {}: {:?}", expr, name, result_type);

        let mut module = JITModule::new(JITBuilder::with_isa(
            self.isa.clone(),
            default_libcall_names(),
        ));
        let mut ctx = module.make_context();
        let mut func_ctx = FunctionBuilderContext::new();

        // (params, row, out) -> status
        let ptr_type = module.target_config().pointer_type();
        ctx.func.signature.params = vec![
            AbiParam::new(ptr_type),
            AbiParam::new(ptr_type),
            AbiParam::new(ptr_type),
        ];
        ctx.func.signature.returns = vec![AbiParam::new(types::I8)];

        let func_id = module
            .declare_function(&name, Linkage::Local, &ctx.func.signature)
            .map_err(codegen_error)?;

        let loads = {
            let mut builder = FunctionBuilder::new(&mut ctx.func, &mut func_ctx);
            let entry = builder.create_block();
            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            builder.seal_block(entry);
            let (params, row, out) = {
                let args = builder.block_params(entry);
                (args[0], args[1], args[2])
            };

            let mut emitter = FunctionEmitter::new(builder, params, row);
            let result = expr.codegen_root(&mut emitter, result_type)?;
            emitter.finish(result, out)
        };
        trace!("{} IR:\n{}", name, ctx.func.display());

        module
            .define_function(func_id, &mut ctx)
            .map_err(codegen_error)?;
        module.clear_context(&mut ctx);
        module.finalize_definitions().map_err(codegen_error)?;

        let raw = module.get_finalized_function(func_id);
        // SAFETY: the declared signature is three pointers in, one i8 out,
        // which is `CompiledFn`. The module travels with the pointer.
        let function = unsafe { std::mem::transmute::<*const u8, CompiledFn>(raw) };

        Ok(CompiledExpression::new(
            function,
            module,
            expr,
            result_type,
            loads,
        ))
    }
}

impl std::fmt::Debug for CodegenBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodegenBackend")
            .field("target", &self.isa.triple().to_string())
            .field("config", &self.config)
            .finish()
    }
}
