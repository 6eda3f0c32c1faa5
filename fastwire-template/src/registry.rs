/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Template registry and link pass.
//!
//! The registry owns every template known to a codec instance. Construction
//! runs a link pass that validates static rules, inlines `templateRef`
//! instructions, and rejects reference cycles. After construction the
//! registry is immutable and freely shared.

use crate::instruction::{FieldType, Instruction, Template};
use fastwire_core::TemplateError;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable collection of linked templates, keyed by template id.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    by_id: HashMap<u32, Arc<Template>>,
    by_name: HashMap<String, u32>,
}

impl TemplateRegistry {
    /// Builds a registry from a set of templates.
    ///
    /// Every template is validated, then `templateRef` instructions are
    /// replaced by the referenced template's instructions. A reference to an
    /// unknown template name or a reference cycle is a link-time error.
    ///
    /// # Arguments
    /// * `templates` - The templates produced by the external loader
    ///
    /// # Errors
    /// Returns `TemplateError` on duplicate ids, static rule violations,
    /// unresolved references, or reference cycles.
    pub fn new(
        templates: impl IntoIterator<Item = Template>,
    ) -> Result<Self, TemplateError> {
        let templates: Vec<Template> = templates.into_iter().collect();

        let mut by_source_name: HashMap<String, Template> = HashMap::new();
        for template in &templates {
            template.validate()?;
            by_source_name.insert(template.name.clone(), template.clone());
        }

        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        for template in templates {
            let mut visiting = vec![template.name.clone()];
            let instructions =
                link_instructions(&template.instructions, &by_source_name, &mut visiting)?;
            let linked = Template {
                id: template.id,
                name: template.name,
                instructions,
            };
            if by_id.contains_key(&linked.id) {
                return Err(TemplateError::DuplicateTemplate(linked.id));
            }
            by_name.insert(linked.name.clone(), linked.id);
            by_id.insert(linked.id, Arc::new(linked));
        }

        Ok(Self { by_id, by_name })
    }

    /// Returns the template with the given id.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Arc<Template>> {
        self.by_id.get(&id)
    }

    /// Returns the template with the given name.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Arc<Template>> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// Returns true if a template with the given id is registered.
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Returns the number of registered templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns true if the registry holds no templates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Returns an iterator over the registered templates.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Template>> {
        self.by_id.values()
    }
}

/// Replaces `templateRef` instructions with the referenced template's
/// instructions, recursing into groups and sequences. `visiting` carries the
/// chain of template names currently being expanded; meeting one again means
/// the references form a cycle.
fn link_instructions(
    instructions: &[Instruction],
    templates: &HashMap<String, Template>,
    visiting: &mut Vec<String>,
) -> Result<Vec<Instruction>, TemplateError> {
    let mut linked = Vec::with_capacity(instructions.len());

    for instruction in instructions {
        match instruction.field_type {
            FieldType::TemplateRef => {
                let target = templates.get(&instruction.name).ok_or_else(|| {
                    TemplateError::UnresolvedReference {
                        name: instruction.name.clone(),
                    }
                })?;
                if visiting.contains(&target.name) {
                    return Err(TemplateError::CyclicReference {
                        name: target.name.clone(),
                    });
                }
                visiting.push(target.name.clone());
                let mut inlined =
                    link_instructions(&target.instructions, templates, visiting)?;
                visiting.pop();
                linked.append(&mut inlined);
            }
            FieldType::Group | FieldType::Sequence => {
                let mut resolved = instruction.clone();
                resolved.instructions =
                    link_instructions(&instruction.instructions, templates, visiting)?;
                linked.push(resolved);
            }
            _ => linked.push(instruction.clone()),
        }
    }

    Ok(linked)
}
