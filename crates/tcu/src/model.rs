//! Model descriptor: the parsed binding of a compiled program, its
//! constants, and named input/output regions to DRAM.
//!
//! Descriptors arrive as JSON produced by the offline compiler. Parsing is
//! tolerant — unknown, missing, or ill-typed fields leave zero defaults —
//! and [`Model::is_valid`] decides afterwards whether the result is
//! usable. File names inside the descriptor are resolved relative to the
//! descriptor's own directory.

use alloc::vec::Vec;

use serde_json::Value;

use platform::FileSystem;

use crate::architecture::Architecture;
use crate::error::{driver_error, Error, Result};
use crate::json;

/// Bounded string capacity for names, file names, and paths.
pub const MAX_STRING: usize = 256;

/// Most constants regions a model may declare.
pub const MAX_CONSTS: usize = 1;
/// Most named inputs a model may declare.
pub const MAX_INPUTS: usize = 4;
/// Most named outputs a model may declare.
pub const MAX_OUTPUTS: usize = 4;

/// The compiled program: file plus expected byte size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramEntry {
    /// Program file name, relative to the descriptor.
    pub file_name: heapless::String<MAX_STRING>,
    /// Expected program size in bytes; zero skips the size check.
    pub size: usize,
}

/// A constants region staged into DRAM1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstsEntry {
    /// Constants file name, relative to the descriptor.
    pub file_name: heapless::String<MAX_STRING>,
    /// Base vector index in DRAM1.
    pub base: usize,
    /// Region size in vectors.
    pub size: usize,
}

/// A named input or output binding in DRAM0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoEntry {
    /// Binding name the application refers to.
    pub name: heapless::String<MAX_STRING>,
    /// Base vector index in DRAM0.
    pub base: usize,
    /// Binding size in vectors.
    pub size: usize,
}

/// A parsed model descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    /// The compiled program.
    pub prog: ProgramEntry,
    /// Constants regions (at most one today).
    pub consts: heapless::Vec<ConstsEntry, MAX_CONSTS>,
    /// Named inputs.
    pub inputs: heapless::Vec<IoEntry, MAX_INPUTS>,
    /// Named outputs.
    pub outputs: heapless::Vec<IoEntry, MAX_OUTPUTS>,
    /// The architecture the model was compiled against.
    pub arch: Architecture,
    /// Stage constants into Local memory right after load.
    pub load_consts_to_local: bool,
    /// Directory of the descriptor file, with trailing separator; file
    /// names resolve against this.
    pub path: heapless::String<MAX_STRING>,
}

fn parse_prog(value: &Value) -> ProgramEntry {
    let mut prog = ProgramEntry::default();
    if value.is_object() {
        json::string_field(value, "file_name", &mut prog.file_name);
        json::size_field(value, "size", &mut prog.size);
    }
    prog
}

fn parse_consts_entry(value: &Value) -> ConstsEntry {
    let mut entry = ConstsEntry::default();
    if value.is_object() {
        json::string_field(value, "file_name", &mut entry.file_name);
        json::size_field(value, "base", &mut entry.base);
        json::size_field(value, "size", &mut entry.size);
    }
    entry
}

fn parse_io_entry(value: &Value) -> IoEntry {
    let mut entry = IoEntry::default();
    if value.is_object() {
        json::string_field(value, "name", &mut entry.name);
        json::size_field(value, "base", &mut entry.base);
        json::size_field(value, "size", &mut entry.size);
    }
    entry
}

impl Model {
    /// Parse a descriptor from a JSON value. Never fails; validation is
    /// [`Model::is_valid`].
    #[must_use]
    pub fn parse(value: &Value) -> Model {
        let mut model = Model::default();
        if !value.is_object() {
            return model;
        }

        if let Some(prog) = value.get("prog") {
            model.prog = parse_prog(prog);
        }
        if let Some(Value::Array(entries)) = value.get("consts") {
            if entries.len() <= MAX_CONSTS {
                for entry in entries {
                    let _ = model.consts.push(parse_consts_entry(entry));
                }
            }
        }
        if let Some(Value::Array(entries)) = value.get("inputs") {
            if entries.len() <= MAX_INPUTS {
                for entry in entries {
                    let _ = model.inputs.push(parse_io_entry(entry));
                }
            }
        }
        if let Some(Value::Array(entries)) = value.get("outputs") {
            if entries.len() <= MAX_OUTPUTS {
                for entry in entries {
                    let _ = model.outputs.push(parse_io_entry(entry));
                }
            }
        }
        if let Some(arch) = value.get("arch") {
            model.arch = Architecture::parse(arch);
        }
        json::bool_field(value, "load_consts_to_local", &mut model.load_consts_to_local);

        model
    }

    /// `true` when the descriptor is complete enough to load: a program
    /// file, nonempty consts/inputs/outputs with nonempty names and sizes,
    /// and a valid architecture.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let consts_valid = self
            .consts
            .iter()
            .all(|entry| !entry.file_name.is_empty() && entry.size > 0);
        let inputs_valid = self
            .inputs
            .iter()
            .all(|entry| !entry.name.is_empty() && entry.size > 0);
        let outputs_valid = self
            .outputs
            .iter()
            .all(|entry| !entry.name.is_empty() && entry.size > 0);

        !self.prog.file_name.is_empty()
            && !self.consts.is_empty()
            && consts_valid
            && !self.inputs.is_empty()
            && inputs_valid
            && !self.outputs.is_empty()
            && outputs_valid
            && self.arch.is_valid()
    }

    /// Read, parse, and validate a descriptor file.
    pub fn from_file<F: FileSystem>(fs: &mut F, file_name: &str) -> Result<Model> {
        let size = fs
            .file_size(file_name)
            .map_err(|e| Error::file_system(e, file_name))?;
        let size = usize::try_from(size)
            .map_err(|_| driver_error!(OutOfHeapMemory, "Out of heap memory"))?;

        let mut raw = Vec::new();
        raw.try_reserve_exact(size)
            .map_err(|_| driver_error!(OutOfHeapMemory, "Out of heap memory"))?;
        raw.resize(size, 0);
        let read = fs
            .read_range(file_name, 0, &mut raw)
            .map_err(|e| Error::file_system(e, file_name))?;

        let value: Value = serde_json::from_slice(raw.get(..read).unwrap_or(&[]))
            .map_err(|_| driver_error!(InvalidJson, "Invalid JSON in {}", file_name))?;

        let mut model = Model::parse(&value);
        if !model.is_valid() {
            return Err(driver_error!(InvalidModel, "Invalid model in {}", file_name));
        }

        // Remember the descriptor's directory for resolving data files.
        let dir_len = file_name.rfind('/').map_or(0, |at| at + 1);
        let dir = file_name.get(..dir_len).unwrap_or("");
        model.path = heapless::String::try_from(dir)
            .map_err(|_| driver_error!(InvalidModel, "Model path too long in {}", file_name))?;

        Ok(model)
    }

    /// Resolve a descriptor-relative file name against the model's
    /// directory.
    pub fn resolve_path(&self, file_name: &str) -> Result<heapless::String<MAX_STRING>> {
        let mut path = self.path.clone();
        path.push_str(file_name)
            .map_err(|_| driver_error!(InvalidModel, "Model file path too long: {}", file_name))?;
        Ok(path)
    }

    /// The input binding with the given name.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&IoEntry> {
        self.inputs.iter().find(|entry| entry.name.as_str() == name)
    }

    /// The output binding with the given name.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&IoEntry> {
        self.outputs.iter().find(|entry| entry.name.as_str() == name)
    }
}
