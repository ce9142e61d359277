//! In-process provisioner double for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::provisioner::{
    ProvisionError, ProvisionResult, Provisioner, Stack, StackOutput, StackStatus,
};

/// A convergence signal issued before its stack exists.
enum PendingSignal {
    Complete { address: String },
    Fail { reason: String },
}

/// A provisioner that keeps its stacks in memory. Tests drive stack
/// convergence explicitly through [`MockProvisioner::complete`] and
/// [`MockProvisioner::fail`]; a signal for a stack that has not been
/// created yet is remembered and applied in `create_stack`, so tests
/// may signal before the background deploy task has run.
#[derive(Default)]
pub struct MockProvisioner {
    stacks: Mutex<HashMap<String, Stack>>,
    created: Mutex<Vec<String>>,
    pending: Mutex<HashMap<String, PendingSignal>>,
}

impl MockProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a stack complete with the given public address output.
    pub fn complete(&self, stack_id: &str, address: &str) {
        let mut stacks = self.stacks.lock().unwrap();
        if let Some(stack) = stacks.get_mut(stack_id) {
            apply_complete(stack, address);
        } else {
            self.pending.lock().unwrap().insert(
                stack_id.to_string(),
                PendingSignal::Complete {
                    address: address.to_string(),
                },
            );
        }
    }

    /// Mark a stack failed with a reason.
    pub fn fail(&self, stack_id: &str, reason: &str) {
        let mut stacks = self.stacks.lock().unwrap();
        if let Some(stack) = stacks.get_mut(stack_id) {
            apply_fail(stack, reason);
        } else {
            self.pending.lock().unwrap().insert(
                stack_id.to_string(),
                PendingSignal::Fail {
                    reason: reason.to_string(),
                },
            );
        }
    }

    /// Stack names passed to `create_stack`, in order.
    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    /// Ids of all stacks created so far, in creation order.
    pub fn stack_ids(&self) -> Vec<String> {
        let created = self.created.lock().unwrap();
        (0..created.len()).map(|i| format!("stack-{i}")).collect()
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn create_stack(
        &self,
        name: &str,
        _template: serde_json::Value,
        _parameters: HashMap<String, String>,
    ) -> ProvisionResult<String> {
        let mut created = self.created.lock().unwrap();
        let id = format!("stack-{}", created.len());
        created.push(name.to_string());
        let mut stack = Stack {
            id: id.clone(),
            status: StackStatus::InProgress,
            status_reason: None,
            outputs: Vec::new(),
        };
        match self.pending.lock().unwrap().remove(&id) {
            Some(PendingSignal::Complete { address }) => apply_complete(&mut stack, &address),
            Some(PendingSignal::Fail { reason }) => apply_fail(&mut stack, &reason),
            None => {}
        }
        self.stacks.lock().unwrap().insert(id.clone(), stack);
        Ok(id)
    }

    async fn get_stack(&self, stack_id: &str) -> ProvisionResult<Stack> {
        self.stacks
            .lock()
            .unwrap()
            .get(stack_id)
            .cloned()
            .ok_or_else(|| ProvisionError::StackNotFound(stack_id.to_string()))
    }
}

fn apply_complete(stack: &mut Stack, address: &str) {
    stack.status = StackStatus::Complete;
    stack.outputs = vec![StackOutput {
        output_key: "public_address".to_string(),
        output_value: address.to_string(),
    }];
}

fn apply_fail(stack: &mut Stack, reason: &str) {
    stack.status = StackStatus::Failed;
    stack.status_reason = Some(reason.to_string());
}
