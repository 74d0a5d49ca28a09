// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Pipeline compiler
//!
//! Compiles a pipeline document into a [`Factory`]. Blocks are compiled in
//! order with the definition table and the previous link threaded through, so
//! each link sees every record declared before it and knows whether it is
//! convex. Templates left to be generated are looked up in the cache first.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::definition::{FanShape, Factory, Link, LinkKind, Mask, Prompt};
use super::sections::{LinkSections, MaskSource, PromptSource};
use super::source::{Block, Document};
use super::template::Template;
use crate::cache::{instruction_key, mask_key, CachedTemplate, TemplateCache, TemplateKind};
use crate::engine::CacheConfig;
use crate::errors::ChainflowError;
use crate::executors::{FsLoader, SourceLoader, TemplateGenerator, ToolRegistry};
use crate::resolve::{FieldPath, InputVariable};
use crate::schema::{DefinitionTable, RecordType};

type CompileFuture<'a> = Pin<Box<dyn Future<Output = Result<Factory, ChainflowError>> + Send + 'a>>;

/// What a generated template is for
enum Generate<'a> {
    Instruction { purpose: &'a str },
    Mask,
}

/// Pipeline compiler
pub struct Compiler {
    generator: Option<Arc<dyn TemplateGenerator>>,
    cache: Option<Arc<dyn TemplateCache>>,
    loader: Arc<dyn SourceLoader>,
    /// Registered tool names; `None` defers the check to run time
    tools: Option<HashSet<String>>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Compiler without generator or cache, loading `@extends` targets from the working directory
    pub fn new() -> Self {
        Self {
            generator: None,
            cache: None,
            loader: Arc::new(FsLoader::default()),
            tools: None,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn TemplateGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn TemplateCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use the template store described by `config`
    pub fn with_cache_config(self, config: &CacheConfig) -> Result<Self, ChainflowError> {
        Ok(self.with_cache(config.open()?))
    }

    pub fn with_loader(mut self, loader: Arc<dyn SourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Check `@tool` names against `registry` at compile time
    pub fn with_tools(mut self, registry: &ToolRegistry) -> Self {
        self.tools = Some(registry.names().into_iter().map(str::to_string).collect());
        self
    }

    /// Compile pipeline source text
    #[instrument(skip_all)]
    pub async fn compile(&self, source: &str) -> Result<Factory, ChainflowError> {
        self.compile_nested(source.to_string(), Vec::new()).await
    }

    /// Load `path` through the source loader and compile it
    #[instrument(skip(self))]
    pub async fn compile_file(&self, path: &str) -> Result<Factory, ChainflowError> {
        let source = self.loader.load(path).await?;
        self.compile_nested(source, vec![path.to_string()]).await
    }

    fn compile_nested(&self, source: String, stack: Vec<String>) -> CompileFuture<'_> {
        Box::pin(async move {
            let document = Document::scan(&source)?;
            debug!(blocks = document.blocks.len(), "scanned pipeline source");

            let base = match document.extends {
                Some(ref extends) => {
                    if stack.contains(&extends.path) {
                        return Err(ChainflowError::ExtendsCycle {
                            path: extends.path.clone(),
                        });
                    }

                    info!(path = %extends.path, "compiling base pipeline");
                    let base_source = self.loader.load(&extends.path).await?;
                    let mut nested = stack.clone();
                    nested.push(extends.path.clone());
                    Some(self.compile_nested(base_source, nested).await?)
                }
                None => None,
            };

            let mut definitions = base
                .as_ref()
                .map(|b| b.definitions.clone())
                .unwrap_or_default();
            let mut links: Vec<Arc<Link>> =
                base.as_ref().map(|b| b.links.clone()).unwrap_or_default();
            let mut kinds: HashMap<String, LinkKind> =
                links.iter().map(|l| (l.name.clone(), l.kind)).collect();

            for block in &document.blocks {
                check_name(&kinds, block)?;

                if block.kind == LinkKind::Chain && block.is_empty() {
                    return Err(ChainflowError::EmptyLink {
                        line: block.line,
                        name: block.name.clone(),
                    });
                }

                let previous = links.last().cloned();
                let link = self
                    .build_link(block, &definitions, previous.as_deref())
                    .await
                    .map_err(|e| e.in_link(block.line, &block.name))?;

                debug!(
                    link = %link.name,
                    shape = %link.shape,
                    tool = link.is_tool(),
                    convex = link.convex,
                    "compiled link"
                );

                definitions.extend(&link.definitions);
                kinds.insert(link.name.clone(), link.kind);
                links.push(Arc::new(link));
            }

            Ok(Factory {
                links,
                definitions,
                base: base.map(Box::new),
            })
        })
    }

    async fn build_link(
        &self,
        block: &Block,
        visible: &DefinitionTable,
        previous: Option<&Link>,
    ) -> Result<Link, ChainflowError> {
        let sections = LinkSections::parse(&block.body())?;
        let after_parallel = previous.map_or(false, |p| p.shape.is_parallel());
        let convex = after_parallel && block.shape == FanShape::Sequential;

        // Records see everything declared before them, including earlier ones in this block
        let mut scope = visible.clone();
        let mut local = DefinitionTable::new();
        for (name, attributes) in &sections.definitions {
            let record = Arc::new(RecordType::build(name, attributes, &scope)?);
            scope.insert(Arc::clone(&record));
            local.insert(record);
        }

        let output = sections
            .output
            .as_ref()
            .map(|attributes| RecordType::build(&format!("{}.out", block.name), attributes, &scope))
            .transpose()?
            .map(Arc::new);

        let mut link = Link {
            name: block.name.clone(),
            shape: block.shape,
            kind: block.kind,
            line: block.line,
            prompt: None,
            variables: sections.input.clone(),
            declared_input: !sections.input.is_empty(),
            output,
            definitions: local,
            mask: None,
            convex,
        };

        match block.kind {
            LinkKind::Tool => {
                if let Some(ref tools) = self.tools {
                    if !tools.contains(&block.name) {
                        return Err(ChainflowError::UnknownTool {
                            line: block.line,
                            name: block.name.clone(),
                        });
                    }
                }
                if sections.has_prompt_sections() {
                    warn!(link = %block.name, "tool links ignore purpose, prompt and mask");
                }
            }
            LinkKind::Chain => {
                let prompt = self.resolve_prompt(block, &sections, convex).await?;
                if !link.declared_input {
                    link.variables = prompt
                        .template
                        .variables()
                        .iter()
                        .map(|v| InputVariable::parse(v))
                        .collect();
                }
                link.prompt = Some(prompt);

                if convex {
                    let mask = self.resolve_mask(block, sections.mask.as_ref(), previous).await?;
                    link.mask = Some(mask);
                } else if sections.mask.is_some() {
                    warn!(link = %block.name, "mask ignored, link does not follow a parallel link");
                }
            }
        }

        if let Some(previous) = previous {
            if after_parallel && block.shape.is_parallel() {
                link.qualify_for_element(&previous.name);
            }
        }

        Ok(link)
    }

    async fn resolve_prompt(
        &self,
        block: &Block,
        sections: &LinkSections,
        convex: bool,
    ) -> Result<Prompt, ChainflowError> {
        match sections.prompt_source(block.line, &block.name)? {
            PromptSource::Template { text, purpose } => Ok(Prompt {
                template: Template::parse(&text)?,
                purpose,
            }),
            PromptSource::Purpose(purpose) => {
                let mut variables: Vec<String> =
                    sections.input.iter().map(InputVariable::key).collect();
                // A convex link consumes the joined mask rendering under its own name
                if convex && !variables.contains(&block.name) {
                    variables.insert(0, block.name.clone());
                }

                if variables.is_empty() {
                    return Err(ChainflowError::InvalidSection {
                        section: "purpose".to_string(),
                        reason: "a purpose needs declared `in` variables".to_string(),
                    });
                }

                let key = instruction_key(&purpose, &variables);
                let template = self
                    .generated_template(
                        Generate::Instruction { purpose: &purpose },
                        &key,
                        &block.name,
                        &variables,
                    )
                    .await?;

                Ok(Prompt {
                    template,
                    purpose: Some(purpose),
                })
            }
        }
    }

    async fn resolve_mask(
        &self,
        block: &Block,
        source: Option<&MaskSource>,
        previous: Option<&Link>,
    ) -> Result<Mask, ChainflowError> {
        let Some(source) = source else {
            return Err(ChainflowError::MissingMask {
                line: block.line,
                name: block.name.clone(),
            });
        };

        let mask = match source {
            MaskSource::Template { text, variables } => {
                let template = Template::parse(text)?;
                if variables.is_empty() {
                    Mask::from_template(template)
                } else {
                    Mask {
                        template,
                        variables: variables.iter().map(|v| FieldPath::parse(v)).collect(),
                    }
                }
            }
            MaskSource::Auto => {
                let fields: Vec<String> = previous
                    .and_then(|p| p.output.as_ref())
                    .map(|out| out.field_names().into_iter().map(str::to_string).collect())
                    .unwrap_or_default();

                if fields.is_empty() {
                    return Err(ChainflowError::InvalidMask {
                        reason: "`auto` needs the previous link to declare `out`".to_string(),
                    });
                }
                self.generated_mask(block, fields).await?
            }
            MaskSource::Variables(variables) => {
                let variables = variables
                    .iter()
                    .map(|v| FieldPath::parse(v).canonical())
                    .collect();
                self.generated_mask(block, variables).await?
            }
        };

        if !mask.template.has_variables() {
            return Err(ChainflowError::InvalidMask {
                reason: "the mask template has no placeholders".to_string(),
            });
        }

        Ok(mask)
    }

    async fn generated_mask(
        &self,
        block: &Block,
        variables: Vec<String>,
    ) -> Result<Mask, ChainflowError> {
        let key = mask_key(&variables);
        let template = self
            .generated_template(Generate::Mask, &key, &block.name, &variables)
            .await?;

        Ok(Mask {
            template,
            variables: variables.iter().map(|v| FieldPath::parse(v)).collect(),
        })
    }

    /// Look a template up in the cache, generating and storing it on a miss
    async fn generated_template(
        &self,
        request: Generate<'_>,
        key: &str,
        link: &str,
        variables: &[String],
    ) -> Result<Template, ChainflowError> {
        if let Some(ref cache) = self.cache {
            match cache.load(key).await {
                Ok(Some(record)) => {
                    debug!(link, key, "template loaded from cache");
                    return Template::parse(&record.template);
                }
                Ok(None) => {}
                Err(e) => warn!(link, error = %e, "template cache lookup failed"),
            }
        }

        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| ChainflowError::MissingGenerator {
                what: format!("link '{}'", link),
            })?;

        let (kind, purpose, text) = match request {
            Generate::Instruction { purpose } => {
                info!(link, ?variables, "generating instruction template");
                let text = generator.instruction_template(link, purpose, variables).await?;
                (TemplateKind::Instruction, Some(purpose), text)
            }
            Generate::Mask => {
                info!(link, ?variables, "generating mask template");
                let text = generator.mask_template(link, variables).await?;
                (TemplateKind::Mask, None, text)
            }
        };

        let template = Template::parse(&text)?;

        if let Some(ref cache) = self.cache {
            let record =
                CachedTemplate::new(kind, link, purpose, variables.to_vec(), template.to_string());
            if let Err(e) = cache.save(key, &record).await {
                warn!(link, error = %e, "failed to store template in cache");
            }
        }

        Ok(template)
    }
}

/// Link names are unique; repeated `@tool`s of one name are allowed
fn check_name(kinds: &HashMap<String, LinkKind>, block: &Block) -> Result<(), ChainflowError> {
    match (kinds.get(&block.name), block.kind) {
        (None, _) | (Some(LinkKind::Tool), LinkKind::Tool) => Ok(()),
        (Some(LinkKind::Chain), LinkKind::Chain) => Err(ChainflowError::DuplicateLink {
            line: block.line,
            name: block.name.clone(),
        }),
        (Some(_), _) => Err(ChainflowError::ToolNameConflict {
            line: block.line,
            name: block.name.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::executors::MemoryLoader;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Generator echoing its variables back as placeholders
    #[derive(Default)]
    struct EchoGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TemplateGenerator for EchoGenerator {
        async fn instruction_template(
            &self,
            _link: &str,
            purpose: &str,
            variables: &[String],
        ) -> Result<String, ChainflowError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let placeholders: Vec<String> =
                variables.iter().map(|v| format!("{{{}}}", v)).collect();
            Ok(format!("{}: {}", purpose, placeholders.join(" ")))
        }

        async fn mask_template(
            &self,
            _link: &str,
            variables: &[String],
        ) -> Result<String, ChainflowError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let placeholders: Vec<String> =
                variables.iter().map(|v| format!("{}={{{}}}", v, v)).collect();
            Ok(placeholders.join(", "))
        }
    }

    #[tokio::test]
    async fn test_single_implicit_link() {
        let factory = Compiler::new()
            .compile("prompt: Tell me about {topic}\nout:\n  fact: str\n")
            .await
            .unwrap();

        assert_eq!(factory.len(), 1);
        let link = &factory.links[0];
        assert_eq!(link.name, "chainlink-0");
        assert_eq!(link.variables[0].key(), "topic");
        assert!(link.output.is_some());
    }

    #[tokio::test]
    async fn test_convex_link_requires_mask() {
        let source = "\
@chainlink gen ||
prompt: Idea about {topic}
@chainlink summary
prompt: Summarise {summary}
";
        let err = Compiler::new().compile(source).await.unwrap_err();
        assert!(matches!(err, ChainflowError::MissingMask { line: 3, .. }));

        let with_mask = format!("{}mask: \"{{idea}}\"\n", source);
        let factory = Compiler::new().compile(&with_mask).await.unwrap();
        assert!(factory.links[1].convex);
        assert!(factory.links[1].mask.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_and_conflicting_names() {
        let err = Compiler::new()
            .compile("@chainlink a\nprompt: x\n@chainlink a\nprompt: y\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ChainflowError::DuplicateLink { line: 3, .. }));

        let err = Compiler::new()
            .compile("@chainlink a\nprompt: x\n@tool a\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ChainflowError::ToolNameConflict { line: 3, .. }));

        let factory = Compiler::new()
            .compile("@chainlink a\nprompt: x\n@tool t\n@tool t\n")
            .await
            .unwrap();
        assert_eq!(factory.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_chainlink_rejected() {
        let err = Compiler::new()
            .compile("@chainlink a\n\n@chainlink b\nprompt: x\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ChainflowError::EmptyLink { line: 1, .. }));
    }

    #[tokio::test]
    async fn test_link_errors_carry_line() {
        let err = Compiler::new()
            .compile("@chainlink a\nprompt: x\n@chainlink b\nprompt: y\nout:\n  z: Mystery\n")
            .await
            .unwrap_err();

        assert_eq!(err.line(), Some(3));
        assert!(err.is_compile_error());
    }

    #[tokio::test]
    async fn test_parallel_after_parallel_is_qualified() {
        let source = "\
@chainlink gen ||
prompt: Idea about {topic}
@chainlink critique ||
prompt: Critique {idea} ({element.score})
";
        let factory = Compiler::new().compile(source).await.unwrap();
        let link = &factory.links[1];
        let vars: Vec<String> = link.variables.iter().map(InputVariable::key).collect();
        assert_eq!(vars, vec!["gen$element$idea", "gen$element$score"]);
    }

    #[tokio::test]
    async fn test_definitions_accumulate() {
        let source = "\
@chainlink a
prompt: x
def:
  Haiku:
    text: str
out:
  haikus: list[Haiku]
@chainlink b
prompt: y {haikus}
out:
  best: Haiku
";
        let factory = Compiler::new().compile(source).await.unwrap();
        assert_eq!(factory.definitions.names(), vec!["Haiku"]);
        assert!(factory.links[1].output.as_ref().unwrap().field("best").is_some());
    }

    #[tokio::test]
    async fn test_purpose_is_generated_once_then_cached() {
        let generator = Arc::new(EchoGenerator::default());
        let cache = Arc::new(MemoryCache::new());
        let compiler = Compiler::new()
            .with_generator(generator.clone())
            .with_cache(cache.clone());

        let source = "in:\n  topic: str\npurpose: write a haiku\n";
        let first = compiler.compile(source).await.unwrap();
        let second = compiler.compile(source).await.unwrap();

        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);

        let template = |f: &Factory| f.links[0].prompt.as_ref().unwrap().template.to_string();
        assert_eq!(template(&first), "write a haiku: {topic}");
        assert_eq!(template(&first), template(&second));
    }

    #[tokio::test]
    async fn test_cache_config_opens_filesystem_store() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = CacheConfig {
            enabled: true,
            directory: temp_dir.path().join("templates"),
        };
        let compiler = Compiler::new()
            .with_generator(Arc::new(EchoGenerator::default()))
            .with_cache_config(&config)
            .unwrap();

        compiler.compile("in: [topic]\npurpose: write\n").await.unwrap();
        assert!(temp_dir.path().join("templates").exists());
    }

    #[tokio::test]
    async fn test_purpose_without_generator() {
        let err = Compiler::new()
            .compile("in: [topic]\npurpose: write\n")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChainflowError::InLink { ref source, .. }
                if matches!(**source, ChainflowError::MissingGenerator { .. })
        ));
    }

    #[tokio::test]
    async fn test_auto_mask_uses_previous_output() {
        let source = "\
@chainlink gen ||
prompt: Idea about {topic}
out:
  title: str
  score: int
@chainlink pick
prompt: Pick one of {pick}
mask: auto
";
        let compiler = Compiler::new().with_generator(Arc::new(EchoGenerator::default()));
        let factory = compiler.compile(source).await.unwrap();

        let mask = factory.links[1].mask.as_ref().unwrap();
        assert_eq!(mask.template.to_string(), "title={title}, score={score}");
    }

    #[tokio::test]
    async fn test_unknown_tool_with_registry() {
        let mut registry = ToolRegistry::new();
        registry.register_fn("known", |_| Ok(None));
        let compiler = Compiler::new().with_tools(&registry);

        assert!(compiler.compile("@tool known\n").await.is_ok());

        let err = compiler.compile("@tool unknown\n").await.unwrap_err();
        assert!(matches!(err, ChainflowError::UnknownTool { line: 1, .. }));
    }

    #[tokio::test]
    async fn test_extends_prepends_base_links() {
        let loader = MemoryLoader::new()
            .with_source(
                "base.chain",
                "@chainlink a\nprompt: x\ndef:\n  Topic:\n    name: str\n@chainlink b\nprompt: y\n",
            );
        let compiler = Compiler::new().with_loader(Arc::new(loader));

        let factory = compiler
            .compile("@extends base.chain\n@chainlink c\nprompt: z\nout:\n  t: Topic\n")
            .await
            .unwrap();

        assert_eq!(factory.link_names(), vec!["a", "b", "c"]);
        assert!(factory.definitions.contains("Topic"));
        assert_eq!(factory.base.as_ref().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_extends_cycle() {
        let loader = MemoryLoader::new()
            .with_source("a", "@extends b\n@chainlink a1\nprompt: x\n")
            .with_source("b", "@extends a\n@chainlink b1\nprompt: y\n");
        let compiler = Compiler::new().with_loader(Arc::new(loader));

        let err = compiler.compile_file("a").await.unwrap_err();
        assert!(matches!(err, ChainflowError::ExtendsCycle { ref path } if path == "a"));
    }
}
