use crate::language::ast::FunctionDef;
use crate::language::errors::SyntaxErrors;
use crate::language::parser::parse_module;
use crate::runtime::error::{ErrorKind, RuntimeError};
use crate::runtime::expr::EvalContext;
use crate::runtime::scope::Frame;
use crate::runtime::sync::ThreadContext;
use crate::runtime::value::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone)]
pub struct RegisteredFunction {
    pub def: Arc<FunctionDef>,
    pub path: Arc<PathBuf>,
}

/// Functions and globals of the root module and the transitive closure of
/// its imports, under their qualified names. Globals are evaluated once at
/// load time and are immutable afterwards.
pub struct ModuleRegistry {
    functions: HashMap<String, RegisteredFunction>,
    pub globals: HashMap<String, Value>,
    pub sources: HashMap<PathBuf, String>,
}

#[derive(Debug)]
pub enum LoadFailure {
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
    Syntax {
        path: PathBuf,
        source: String,
        errors: SyntaxErrors,
    },
    Runtime(RuntimeError),
}

impl ModuleRegistry {
    pub fn load(root: &Path) -> Result<Self, LoadFailure> {
        let mut registry = Self {
            functions: HashMap::new(),
            globals: HashMap::new(),
            sources: HashMap::new(),
        };
        let mut loading = HashSet::new();
        registry.load_module(root, None, &mut loading)?;
        Ok(registry)
    }

    /// Registers a single in-memory module. Used by tests and by embedders
    /// that do not go through the filesystem.
    pub fn from_source(name: &str, source: &str) -> Result<Self, LoadFailure> {
        let path = PathBuf::from(format!("{}.rail", name));
        let mut registry = Self {
            functions: HashMap::new(),
            globals: HashMap::new(),
            sources: HashMap::new(),
        };
        let module = match parse_module(name, path.clone(), source) {
            Ok(module) => module,
            Err(errors) => {
                return Err(LoadFailure::Syntax {
                    path,
                    source: source.to_string(),
                    errors,
                });
            }
        };
        registry.register(module, source.to_string(), None)?;
        Ok(registry)
    }

    pub fn function(&self, name: &str) -> Option<&RegisteredFunction> {
        self.functions.get(name)
    }

    pub fn main_function(&self) -> Option<&RegisteredFunction> {
        self.functions
            .get("main")
            .or_else(|| self.functions.get(".main"))
    }

    fn load_module(
        &mut self,
        path: &Path,
        qualifier: Option<&str>,
        loading: &mut HashSet<PathBuf>,
    ) -> Result<(), LoadFailure> {
        let canonical = path.canonicalize().map_err(|error| LoadFailure::Io {
            path: path.to_path_buf(),
            error,
        })?;
        if !loading.insert(canonical.clone()) {
            return Err(LoadFailure::Runtime(RuntimeError::bare(ErrorKind::Load(
                format!("Circular import of '{}'", path.display()),
            ))));
        }
        let source = std::fs::read_to_string(path).map_err(|error| LoadFailure::Io {
            path: path.to_path_buf(),
            error,
        })?;
        let stem = module_stem(path);
        let module = match parse_module(&stem, path.to_path_buf(), &source) {
            Ok(module) => module,
            Err(errors) => {
                return Err(LoadFailure::Syntax {
                    path: path.to_path_buf(),
                    source,
                    errors,
                });
            }
        };

        // Imports first so a module's globals can read its dependencies
        for import in &module.imports {
            let child_path = path
                .parent()
                .map(|dir| dir.join(&import.path))
                .unwrap_or_else(|| PathBuf::from(&import.path));
            let child_stem = module_stem(&child_path);
            let child_alias = import.alias.as_deref().unwrap_or(&child_stem);
            let child_qualifier = match qualifier {
                Some(outer) => format!("{}.{}", outer, child_alias),
                None => child_alias.to_string(),
            };
            self.load_module(&child_path, Some(&child_qualifier), loading)?;
        }
        self.register(module, source, qualifier)?;
        loading.remove(&canonical);
        Ok(())
    }

    fn register(
        &mut self,
        module: crate::language::ast::Module,
        source: String,
        qualifier: Option<&str>,
    ) -> Result<(), LoadFailure> {
        let path = module.path.clone();

        for global in &module.globals {
            let value = {
                let frame = Frame::new();
                let ctx = EvalContext {
                    frame: &frame,
                    globals: &self.globals,
                    thread: ThreadContext::root(),
                };
                ctx.eval(&global.value)
                    .map_err(|err| LoadFailure::Runtime(err.with_path(&path)))?
            };
            let name = qualify(qualifier, &global.name);
            if self.globals.insert(name.clone(), value).is_some() {
                return Err(clash(&name, &path));
            }
        }

        let shared_path = Arc::new(path.clone());
        for func in module.functions {
            let name = qualify(qualifier, &func.name);
            let entry = RegisteredFunction {
                def: Arc::new(func),
                path: Arc::clone(&shared_path),
            };
            if self.functions.insert(name.clone(), entry).is_some() {
                return Err(clash(&name, &path));
            }
        }
        self.sources.insert(path, source);
        Ok(())
    }
}

fn clash(name: &str, path: &Path) -> LoadFailure {
    LoadFailure::Runtime(
        RuntimeError::bare(ErrorKind::Load(format!(
            "Name clash of '{}' during import",
            name
        )))
        .with_path(path),
    )
}

fn qualify(qualifier: Option<&str>, name: &str) -> String {
    match qualifier {
        None => name.to_string(),
        Some(prefix) => match name.strip_prefix('.') {
            Some(bare) => format!(".{}.{}", prefix, bare),
            None => format!("{}.{}", prefix, name),
        },
    }
}

fn module_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string())
}
