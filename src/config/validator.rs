use crate::config::{Config, SCHEMA_VERSION};
use crate::embedding::model_dimension;
use crate::error::{LectorError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_context(config, &mut errors);
        Self::validate_generation(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LectorError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }

        if config.storage.keep_generations == 0 {
            errors.push(ValidationError::new(
                "storage.keep_generations",
                "At least one generation must be kept",
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;
        if chunking.size == 0 {
            errors.push(ValidationError::new(
                "chunking.size",
                "Chunk size must be greater than 0",
            ));
        }

        if chunking.overlap >= chunking.size {
            errors.push(ValidationError::new(
                "chunking.overlap",
                format!(
                    "Overlap ({}) must be smaller than chunk size ({})",
                    chunking.overlap, chunking.size
                ),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let model = &config.embedding.model;
        if model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        } else if model_dimension(model).is_none() {
            errors.push(ValidationError::new(
                "embedding.model",
                format!("Unsupported embedding model: {}", model),
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;
        if retrieval.top_k_vector == 0 && retrieval.top_k_keyword == 0 {
            errors.push(ValidationError::new(
                "retrieval",
                "At least one of top_k_vector and top_k_keyword must be greater than 0",
            ));
        }

        if retrieval.timeout_ms == Some(0) {
            errors.push(ValidationError::new(
                "retrieval.timeout_ms",
                "Timeout must be greater than 0 (omit it to disable)",
            ));
        }
    }

    fn validate_context(config: &Config, errors: &mut Vec<ValidationError>) {
        let context = &config.context;
        if context.url_attribute.is_empty() {
            errors.push(ValidationError::new(
                "context.url_attribute",
                "URL attribute name cannot be empty",
            ));
        }

        if !context.fallback_url_template.contains("{source_id}") {
            errors.push(ValidationError::new(
                "context.fallback_url_template",
                "Template must contain the {source_id} placeholder",
            ));
        }

        if context.max_context_chars == Some(0) {
            errors.push(ValidationError::new(
                "context.max_context_chars",
                "Context cap must be greater than 0 (omit it to disable)",
            ));
        }
    }

    fn validate_generation(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.generation.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "generation.timeout_ms",
                "Timeout must be greater than 0",
            ));
        }

        for (i, backend) in config.generation.backends.iter().enumerate() {
            if backend.name.is_empty() {
                errors.push(ValidationError::new(
                    format!("generation.backends[{}].name", i),
                    "Backend name cannot be empty",
                ));
            }
            if backend.program.is_empty() {
                errors.push(ValidationError::new(
                    format!("generation.backends[{}].program", i),
                    "Backend program cannot be empty",
                ));
            }
        }
    }
}
