//! Answer generation
//!
//! The retrieval core does not care how answers are produced. An
//! `AnswerGenerator` turns a finished prompt into text; `CommandGenerator`
//! shells out to a local program, and `FallbackChain` tries several backends
//! in order until one yields a non-empty answer.

use crate::config::GenerationConfig;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Answer returned when every backend failed
pub const APOLOGY_ANSWER: &str = "I'm sorry, but I couldn't generate a complete answer due to temporary LLM issues. Please try again in a moment.";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors raised by generation backends
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Backend '{backend}' could not be started: {source}")]
    Spawn {
        backend: String,
        source: std::io::Error,
    },

    #[error("Backend '{backend}' I/O failure: {source}")]
    Io {
        backend: String,
        source: std::io::Error,
    },

    #[error("Backend '{backend}' timed out after {after_ms}ms")]
    Timeout { backend: String, after_ms: u64 },

    #[error("Backend '{backend}' exited with {status}: {stderr}")]
    Failed {
        backend: String,
        status: String,
        stderr: String,
    },

    #[error("Backend '{backend}' returned an empty answer")]
    EmptyAnswer { backend: String },

    #[error("No generation backends configured")]
    NoBackends,

    #[error("All {attempts} generation backends failed")]
    Exhausted { attempts: usize },
}

/// Anything that can turn a prompt into an answer
pub trait AnswerGenerator: Send + Sync {
    /// Generate an answer; empty output counts as failure
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Runs a local program: prompt on stdin, answer on stdout
pub struct CommandGenerator {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(
        name: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            timeout,
        }
    }

    fn io_error(&self, source: std::io::Error) -> GenerationError {
        GenerationError::Io {
            backend: self.name.clone(),
            source,
        }
    }
}

impl AnswerGenerator for CommandGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GenerationError::Spawn {
                backend: self.name.clone(),
                source,
            })?;

        let missing_pipe = || std::io::Error::new(std::io::ErrorKind::BrokenPipe, "missing pipe");
        let mut stdin = child.stdin.take().ok_or_else(|| self.io_error(missing_pipe()))?;
        let mut stdout = child.stdout.take().ok_or_else(|| self.io_error(missing_pipe()))?;
        let mut stderr = child.stderr.take().ok_or_else(|| self.io_error(missing_pipe()))?;

        // Pipes are drained on their own threads so a chatty child cannot block
        // on a full buffer while we wait for it.
        let input = prompt.to_string();
        let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));
        let reader = thread::spawn(move || {
            let mut out = String::new();
            stdout.read_to_string(&mut out).map(|_| out)
        });
        let err_reader = thread::spawn(move || {
            let mut err = String::new();
            let _ = stderr.read_to_string(&mut err);
            err
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait().map_err(|e| self.io_error(e))? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(GenerationError::Timeout {
                        backend: self.name.clone(),
                        after_ms: self.timeout.as_millis() as u64,
                    });
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        // A child that exits without reading stdin yields a broken pipe here
        let _ = writer.join();
        let output = reader
            .join()
            .map_err(|_| self.io_error(std::io::Error::other("stdout reader panicked")))?
            .map_err(|e| self.io_error(e))?;
        let stderr = err_reader.join().unwrap_or_default();

        if !status.success() {
            return Err(GenerationError::Failed {
                backend: self.name.clone(),
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let answer = output.trim();
        if answer.is_empty() {
            return Err(GenerationError::EmptyAnswer {
                backend: self.name.clone(),
            });
        }

        Ok(answer.to_string())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Ordered list of backends; the first success wins
pub struct FallbackChain {
    backends: Vec<Box<dyn AnswerGenerator>>,
}

impl FallbackChain {
    pub fn new(backends: Vec<Box<dyn AnswerGenerator>>) -> Self {
        Self { backends }
    }

    /// Build a chain of `CommandGenerator`s from configuration
    pub fn from_config(config: &GenerationConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);
        let backends = config
            .backends
            .iter()
            .map(|backend| {
                Box::new(CommandGenerator::new(
                    &backend.name,
                    &backend.program,
                    backend.args.clone(),
                    timeout,
                )) as Box<dyn AnswerGenerator>
            })
            .collect();
        Self::new(backends)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl AnswerGenerator for FallbackChain {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if self.backends.is_empty() {
            return Err(GenerationError::NoBackends);
        }

        for backend in &self.backends {
            tracing::debug!("Trying generation backend '{}'", backend.name());
            match backend.generate(prompt) {
                Ok(answer) => {
                    tracing::info!("Generation backend '{}' succeeded", backend.name());
                    return Ok(answer);
                }
                Err(e) => {
                    tracing::warn!("Generation backend '{}' failed: {}", backend.name(), e);
                }
            }
        }

        Err(GenerationError::Exhausted {
            attempts: self.backends.len(),
        })
    }

    fn name(&self) -> &str {
        "fallback-chain"
    }
}

/// Prompt handed to the generator
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a helpful research assistant.\n\
         Use only the context below to answer the question clearly. \
         If the context does not contain the answer, say so.\n\n\
         Context:\n{}\n\n\
         Question:\n{}\n",
        context,
        question.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        name: &'static str,
        answer: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl AnswerGenerator for Scripted {
        fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .map(str::to_string)
                .ok_or_else(|| GenerationError::EmptyAnswer {
                    backend: self.name.to_string(),
                })
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    #[test]
    fn test_chain_falls_through_to_first_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = FallbackChain::new(vec![
            Box::new(Scripted {
                name: "primary",
                answer: None,
                calls: calls.clone(),
            }),
            Box::new(Scripted {
                name: "secondary",
                answer: Some("42"),
                calls: calls.clone(),
            }),
            Box::new(Scripted {
                name: "tertiary",
                answer: Some("never"),
                calls: calls.clone(),
            }),
        ]);

        assert_eq!(chain.generate("q").unwrap(), "42");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_chain_exhausted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = FallbackChain::new(vec![Box::new(Scripted {
            name: "only",
            answer: None,
            calls,
        })]);

        assert!(matches!(
            chain.generate("q"),
            Err(GenerationError::Exhausted { attempts: 1 })
        ));
        assert!(matches!(
            FallbackChain::new(vec![]).generate("q"),
            Err(GenerationError::NoBackends)
        ));
    }

    #[test]
    fn test_prompt_contains_context_and_question() {
        let prompt = build_prompt("  What is attention?  ", "Attention is all you need.");
        assert!(prompt.contains("Context:\nAttention is all you need."));
        assert!(prompt.contains("Question:\nWhat is attention?\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_generator_reads_stdout() {
        let generator = CommandGenerator::new(
            "cat",
            "sh",
            vec!["-c".to_string(), "cat; echo".to_string()],
            Duration::from_secs(5),
        );
        assert_eq!(generator.generate("echoed back\n").unwrap(), "echoed back");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_generator_failures() {
        let failing = CommandGenerator::new(
            "fail",
            "sh",
            vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
            Duration::from_secs(5),
        );
        match failing.generate("q") {
            Err(GenerationError::Failed { stderr, .. }) => assert_eq!(stderr, "boom"),
            other => panic!("unexpected result: {:?}", other),
        }

        let silent = CommandGenerator::new(
            "silent",
            "sh",
            vec!["-c".to_string(), "cat > /dev/null".to_string()],
            Duration::from_secs(5),
        );
        assert!(matches!(
            silent.generate("q"),
            Err(GenerationError::EmptyAnswer { .. })
        ));

        let slow = CommandGenerator::new(
            "slow",
            "sh",
            vec!["-c".to_string(), "sleep 5".to_string()],
            Duration::from_millis(100),
        );
        assert!(matches!(
            slow.generate("q"),
            Err(GenerationError::Timeout { after_ms: 100, .. })
        ));

        let missing = CommandGenerator::new(
            "missing",
            "/nonexistent/lector-generator",
            vec![],
            Duration::from_secs(1),
        );
        assert!(matches!(
            missing.generate("q"),
            Err(GenerationError::Spawn { .. })
        ));
    }
}
