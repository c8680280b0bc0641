//! Skill and saga registries.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use skillgate_contracts::skill::Skill;

use crate::saga::SagaStep;
use crate::traits::SkillExecutor;
use crate::{read, write};

/// A registered skill: its immutable descriptor and the executor behind it.
#[derive(Clone)]
pub struct RegisteredSkill {
    pub skill: Arc<Skill>,
    pub executor: Arc<dyn SkillExecutor>,
}

/// Map of skill id to descriptor and executor, read on every admission.
#[derive(Default)]
pub struct SkillRegistry {
    skills: RwLock<HashMap<String, RegisteredSkill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the skill registered under `skill.id`.
    pub fn insert(&self, skill: Skill, executor: Arc<dyn SkillExecutor>) -> Arc<Skill> {
        let skill = Arc::new(skill);
        write(&self.skills).insert(
            skill.id.clone(),
            RegisteredSkill { skill: Arc::clone(&skill), executor },
        );
        skill
    }

    pub fn get(&self, skill_id: &str) -> Option<RegisteredSkill> {
        read(&self.skills).get(skill_id).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.skills).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Map of saga id to its ordered steps.
#[derive(Default)]
pub struct SagaRegistry {
    sagas: RwLock<HashMap<String, Arc<Vec<SagaStep>>>>,
}

impl SagaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, saga_id: impl Into<String>, steps: Vec<SagaStep>) {
        write(&self.sagas).insert(saga_id.into(), Arc::new(steps));
    }

    pub fn get(&self, saga_id: &str) -> Option<Arc<Vec<SagaStep>>> {
        read(&self.sagas).get(saga_id).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.sagas).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
