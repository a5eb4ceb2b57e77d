//! The compilation driver: from parsed form files to generated modules on
//! disk.
//!
//! Compilation of one file is a pure function of the file and the options;
//! no state is shared between files, so independent files are compiled in
//! parallel with `rayon`. One file's failure never blocks another's
//! compilation, and no partial output file is left behind after a failure
//! (output is written to a temporary file and renamed into place).

use crate::codegen::{emit_module, FormMetadata, GeneratedModule, UnknownLanguage, TargetLanguage};
use crate::element::ElementError;
use crate::estimate::StandardDegreePolicy;
use crate::form::{Form, RepresentationChoice, ShapeError};
use crate::representation::{plan_form, PlanOptions, TermError};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

/// Options consumed by the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerOptions {
    /// Output language of generated modules.
    pub language: TargetLanguage,
    /// Default representation for terms without an explicit override.
    pub representation: RepresentationChoice,
    /// Apply algebraic simplification before factorization.
    pub optimize: bool,
    /// Directory generated modules are written to.
    pub output_dir: PathBuf,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            language: TargetLanguage::default(),
            representation: RepresentationChoice::Auto,
            optimize: false,
            output_dir: PathBuf::from("."),
        }
    }
}

/// The parsed content of one input file: up to three named forms.
///
/// The naming follows the input language convention: `a` for the bilinear
/// form, `L` for the linear form, `M` for the functional.
#[derive(Debug, Clone)]
pub struct FormFile {
    pub prefix: String,
    pub bilinear: Option<Form>,
    pub linear: Option<Form>,
    pub functional: Option<Form>,
}

impl FormFile {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            bilinear: None,
            linear: None,
            functional: None,
        }
    }

    pub fn with_bilinear(mut self, form: Form) -> Self {
        self.bilinear = Some(form);
        self
    }

    pub fn with_linear(mut self, form: Form) -> Self {
        self.linear = Some(form);
        self
    }

    pub fn with_functional(mut self, form: Form) -> Self {
        self.functional = Some(form);
        self
    }

    /// The declared forms in fixed order with their conventional names.
    pub fn named_forms(&self) -> Vec<(&'static str, &Form)> {
        [
            ("a", self.bilinear.as_ref()),
            ("L", self.linear.as_ref()),
            ("M", self.functional.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, form)| form.map(|form| (name, form)))
        .collect()
    }
}

/// Errors aborting the compilation of one form file. Failures are local to
/// the file; other files compile independently.
#[derive(Debug)]
#[non_exhaustive]
pub enum CompileError {
    Shape(ShapeError),
    Element(ElementError),
    Term { form: String, error: TermError },
    Language(UnknownLanguage),
    /// The input file declares no forms at all.
    EmptyFile { prefix: String },
    Io { path: PathBuf, message: String },
}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(error) => write!(f, "{}", error),
            Self::Element(error) => write!(f, "{}", error),
            Self::Term { form, error } => write!(f, "in form `{}`: {}", form, error),
            Self::Language(error) => write!(f, "{}", error),
            Self::EmptyFile { prefix } => {
                write!(f, "input `{}` declares no forms (expected a, L or M)", prefix)
            }
            Self::Io { path, message } => {
                write!(f, "failed to write `{}`: {}", path.display(), message)
            }
        }?;
        write!(f, " (increase verbosity for a full trace)")
    }
}

impl std::error::Error for CompileError {}

impl From<ShapeError> for CompileError {
    fn from(error: ShapeError) -> Self {
        Self::Shape(error)
    }
}

impl From<ElementError> for CompileError {
    fn from(error: ElementError) -> Self {
        Self::Element(error)
    }
}

impl From<UnknownLanguage> for CompileError {
    fn from(error: UnknownLanguage) -> Self {
        Self::Language(error)
    }
}

impl CompileError {
    /// The process exit status a command-line frontend should report for
    /// this error.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Compiles one form file to a generated module. Pure: no I/O, no shared
/// state.
pub fn compile_form_file(
    file: &FormFile,
    options: &CompilerOptions,
) -> Result<GeneratedModule, CompileError> {
    let named_forms = file.named_forms();
    if named_forms.is_empty() {
        return Err(CompileError::EmptyFile {
            prefix: file.prefix.clone(),
        });
    }

    let plan_options = PlanOptions {
        default_representation: options.representation,
        optimize: options.optimize,
    };
    let policy = StandardDegreePolicy;

    let mut compiled = Vec::with_capacity(named_forms.len());
    for (name, form) in &named_forms {
        debug!("{}: planning form `{}`", file.prefix, name);
        let planned = plan_form(form, &plan_options, &policy).map_err(|error| {
            CompileError::Term {
                form: name.to_string(),
                error,
            }
        })?;
        compiled.push((*name, planned));
    }

    let form_refs: Vec<(&str, &crate::representation::CompiledForm)> = compiled
        .iter()
        .map(|(name, planned)| (*name, planned))
        .collect();
    Ok(emit_module(&file.prefix, &form_refs, options.language))
}

/// Writes a generated module into the output directory.
///
/// The module is written to a temporary file first and renamed into place,
/// so a failed compilation or write never leaves a partial output file.
pub fn write_module(
    module: &GeneratedModule,
    output_dir: &Path,
) -> Result<PathBuf, CompileError> {
    let file_name = format!("{}.rs", module.prefix);
    let final_path = output_dir.join(&file_name);
    let temp_path = output_dir.join(format!(".{}.tmp", file_name));

    let io_error = |path: &Path, error: std::io::Error| CompileError::Io {
        path: path.to_path_buf(),
        message: error.to_string(),
    };

    fs::write(&temp_path, module.source.as_bytes()).map_err(|e| io_error(&temp_path, e))?;
    if let Err(error) = fs::rename(&temp_path, &final_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(io_error(&final_path, error));
    }
    Ok(final_path)
}

/// The outcome of compiling and writing one form file.
#[derive(Debug)]
pub struct FileOutcome {
    pub prefix: String,
    pub result: Result<(PathBuf, Vec<FormMetadata>), CompileError>,
}

/// Compiles one form file and writes its module to the output directory.
pub fn compile_and_write(file: &FormFile, options: &CompilerOptions) -> FileOutcome {
    let result = compile_form_file(file, options).and_then(|module| {
        let path = write_module(&module, &options.output_dir)?;
        info!("{}: wrote {}", file.prefix, path.display());
        Ok((path, module.metadata))
    });
    FileOutcome {
        prefix: file.prefix.clone(),
        result,
    }
}

/// Compiles independent form files in parallel. Input order is preserved
/// in the returned outcomes; a failing file never affects the others.
pub fn compile_many(files: &[FormFile], options: &CompilerOptions) -> Vec<FileOutcome> {
    files
        .par_iter()
        .map(|file| compile_and_write(file, options))
        .collect()
}
