//! Stage driver: source text to compiled artifact.
//!
//! Stages run strictly in order on a fresh [`CompilerContext`] per object.
//! Lexer and parser errors stop immediately; analyzer errors are collected
//! and stop before optimization; optimizer and codegen errors are fatal.
//! A failed compilation never returns a partial artifact.

use thiserror::Error;
use tracing::{debug, debug_span, info_span, warn};

use crate::analysis::{AnalysisReport, analyze};
use crate::bytecode::CompiledArtifact;
use crate::bytecode::compile::generate;
use crate::config::CompilerOptions;
use crate::context::CompilerContext;
use crate::diagnostics::{Diagnostic, Phase};
use crate::frontend::{Lexer, Parser};
use crate::lang::node::{Object, Position};
use crate::normalize::normalize;
use crate::optimize::{OptimizationReport, inline, optimize, peephole};

/// A successful compilation.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub artifact: CompiledArtifact,
    /// Warnings and analysis findings, nested objects included.
    pub diagnostics: Vec<Diagnostic>,
    pub report: AnalysisReport,
    pub optimization: OptimizationReport,
}

/// A failed compilation. Holds at least one error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("compilation failed with {} error(s)", .diagnostics.iter().filter(|d| d.is_error()).count())]
pub struct CompileFailure {
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileFailure {
    fn single(diagnostic: Diagnostic) -> Self {
        Self {
            diagnostics: vec![diagnostic],
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    /// The first error, the one that stopped compilation.
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.errors().next()
    }
}

/// Compiles `source` with `options`.
pub fn compile(source: &str, options: &CompilerOptions) -> Result<Compilation, CompileFailure> {
    let span = info_span!(
        "compile",
        level = options.optimization_level,
        target = %options.target_version
    );
    let _enter = span.enter();

    options.validate().map_err(|err| {
        CompileFailure::single(Diagnostic::error(
            Phase::Config,
            err.to_string(),
            Position::default(),
        ))
    })?;

    let tokens = Lexer::new(source)
        .tokenize()
        .map_err(|err| CompileFailure::single(err.into()))?;
    debug!(tokens = tokens.len(), "lexed");

    let object = Parser::new(tokens)
        .parse()
        .map_err(|err| CompileFailure::single(err.into()))?;
    debug!(object = %object.name, nested = object.objects.len(), "parsed");

    compile_object(object, options)
}

/// Compiles a parsed object and, independently, each of its nested objects.
pub fn compile_object(
    mut object: Object,
    options: &CompilerOptions,
) -> Result<Compilation, CompileFailure> {
    let span = debug_span!("object", name = %object.name);
    let _enter = span.enter();

    let nested = std::mem::take(&mut object.objects);
    let mut ctx = CompilerContext::new(options.clone());

    let object = normalize(object, &mut ctx);

    let report = analyze(&object, &mut ctx);
    if report.has_errors() {
        ctx.diagnostics.extend(report.errors.iter().cloned());
        ctx.diagnostics.extend(report.warning_diagnostics());
        return Err(CompileFailure {
            diagnostics: ctx.diagnostics.into_vec(),
        });
    }
    ctx.diagnostics.extend(report.warning_diagnostics());
    if !ctx.diagnostics.is_empty() {
        warn!(
            object = %object.name,
            count = ctx.diagnostics.len(),
            "analysis reported warnings"
        );
    }

    let pos = object.pos;
    let (object, mut optimization) = optimize(object, &ctx).map_err(|err| {
        CompileFailure::single(Diagnostic::error(Phase::Optimizer, err.to_string(), pos))
    })?;

    let mut generated =
        generate(&object, options).map_err(|err| CompileFailure::single(err.to_diagnostic()))?;
    if options.optimization_level >= 2 {
        optimization.peephole = peephole::optimize(&mut generated.assembly);
    }

    let constants = inline::constant_functions(&object.code);
    let mut artifact = generated
        .into_artifact(&object.name, options, &ctx.types, constants)
        .map_err(|err| CompileFailure::single(err.to_diagnostic()))?;

    let mut diagnostics = ctx.diagnostics.into_vec();
    for sub in nested {
        let compiled = compile_object(sub, options)?;
        diagnostics.extend(compiled.diagnostics);
        artifact.sub_objects.push(compiled.artifact);
    }

    debug!(
        object = %artifact.name,
        bytes = artifact.bytecode.len(),
        methods = artifact.methods.len(),
        max_stack_depth = artifact.max_stack_depth,
        "compiled"
    );
    Ok(Compilation {
        artifact,
        diagnostics,
        report,
        optimization,
    })
}
