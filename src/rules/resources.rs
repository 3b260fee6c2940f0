// src/rules/resources.rs

use crate::types::MemorySize;

/// Hints forwarded to the external invocation of a task.
///
/// Only `threads` influences local scheduling (it is the number of worker
/// slots a Match occupies); memory and environment are passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceProfile {
    pub threads: u32,
    pub memory: Option<MemorySize>,
    pub environment: Option<String>,
}

impl Default for ResourceProfile {
    fn default() -> Self {
        Self {
            threads: 1,
            memory: None,
            environment: None,
        }
    }
}

impl ResourceProfile {
    /// Environment variables exported to the process.
    pub fn env_vars(&self, task: &str) -> Vec<(String, String)> {
        let mut vars = vec![
            ("FILEDAG_TASK".to_string(), task.to_string()),
            ("FILEDAG_THREADS".to_string(), self.threads.to_string()),
        ];
        if let Some(memory) = self.memory {
            vars.push(("FILEDAG_MEMORY".to_string(), memory.bytes().to_string()));
        }
        if let Some(env) = &self.environment {
            vars.push(("FILEDAG_ENVIRONMENT".to_string(), env.clone()));
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_vars_skip_unset_hints() {
        let profile = ResourceProfile {
            threads: 8,
            memory: Some(MemorySize::from_bytes(1024)),
            environment: None,
        };
        let vars = profile.env_vars("align");
        assert!(vars.contains(&("FILEDAG_THREADS".into(), "8".into())));
        assert!(vars.contains(&("FILEDAG_MEMORY".into(), "1024".into())));
        assert!(!vars.iter().any(|(k, _)| k == "FILEDAG_ENVIRONMENT"));
    }
}
