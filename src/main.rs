//! exprgen - evaluate parameter expressions interpreted and compiled

use anyhow::{anyhow, Context, Result};
use clap::Parser as ClapParser;
use exprgen::access::Value;
use exprgen::codegen::{CodegenBackend, CodegenConfig, OptLevel, PreparedExpression};
use exprgen::execution::ExecutionContext;
use exprgen::expression::{BinaryOperator, Expression, ExpressionBuilder, ExpressionResult};

/// Bind parameters, then evaluate expressions over them both interpreted
/// and as native code
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Parameter values: i:42, f:2.5, b:true, s:text or null
    #[arg(short, long, value_delimiter = ',')]
    param: Vec<String>,

    /// Also evaluate `$LEFT <OP> $RIGHT` (e.g. +, <=, AND, ||)
    #[arg(short, long)]
    op: Option<String>,

    /// Left parameter index for --op
    #[arg(long, default_value = "0")]
    left: usize,

    /// Right parameter index for --op
    #[arg(long, default_value = "1")]
    right: usize,

    /// Skip native code generation
    #[arg(short, long)]
    interpret_only: bool,

    /// Disable code generator optimizations
    #[arg(long)]
    no_opt: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let values = args
        .param
        .iter()
        .map(String::as_str)
        .map(Value::parse_typed)
        .collect::<Result<Vec<_>>>()?;
    let ctx = ExecutionContext::with_parameters(values);
    let builder = ExpressionBuilder::new(&ctx);

    let backend = if args.interpret_only {
        None
    } else {
        let config = CodegenConfig {
            opt_level: if args.no_opt {
                OptLevel::None
            } else {
                OptLevel::Speed
            },
            ..CodegenConfig::default()
        };
        Some(CodegenBackend::with_config(config).context("Failed to set up code generation")?)
    };

    let mut expressions = Vec::new();
    for index in 0..ctx.bindings().len() {
        expressions.push(builder.parameter(index)?);
    }
    if let Some(symbol) = &args.op {
        let op = BinaryOperator::from_symbol(symbol)
            .ok_or_else(|| anyhow!("Unknown operator: {}", symbol))?;
        let expr = builder
            .binary(op, builder.parameter(args.left)?, builder.parameter(args.right)?)
            .with_context(|| format!("Cannot apply {}", symbol))?;
        expressions.push(expr);
    }

    for expr in expressions {
        report(&ctx, backend.as_ref(), expr)?;
    }
    Ok(())
}

fn report(
    ctx: &ExecutionContext,
    backend: Option<&CodegenBackend>,
    expr: Expression,
) -> Result<()> {
    let interpreted = expr.evaluate(ctx, &[]);
    let label = expr.to_string();
    let prepared = match backend {
        Some(backend) => Some(
            PreparedExpression::prepare(backend, expr)
                .with_context(|| format!("Failed to prepare {}", label))?,
        ),
        None => None,
    };

    let shown = |result: &ExpressionResult<Value>| match result {
        Ok(value) => value.to_string(),
        Err(e) => format!("error: {}", e),
    };
    match prepared {
        Some(prepared) if prepared.is_compiled() => {
            let compiled = prepared.evaluate(ctx, &[]);
            println!(
                "{:<24} interpreted={:<16} compiled={}",
                label,
                shown(&interpreted),
                shown(&compiled)
            );
        }
        Some(_) => println!(
            "{:<24} interpreted={:<16} compiled=(interpreted fallback)",
            label,
            shown(&interpreted)
        ),
        None => println!("{:<24} interpreted={}", label, shown(&interpreted)),
    }
    Ok(())
}
