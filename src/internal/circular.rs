//! Circular dependency detection infrastructure.

use crate::error::{DiError, DiResult};
use crate::module::ModuleId;
use crate::token::Token;

const MAX_DEPTH: usize = 1024;

/// Providers currently under construction in one resolution call chain.
///
/// Resolution is async and may hop threads between suspension points, so the
/// stack travels with the call instead of living in thread-local storage.
/// Frames are keyed by the owning module: the same token declared in two
/// modules is two different providers.
#[derive(Clone, Default, Debug)]
pub(crate) struct ResolutionPath {
    frames: Vec<(ModuleId, Token)>,
}

impl ResolutionPath {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the path extended by `(module, token)`.
    ///
    /// Fails with `CircularDependency` when the provider is already on the
    /// path, before anything is pushed.
    pub(crate) fn enter(&self, module: ModuleId, token: &Token) -> DiResult<ResolutionPath> {
        if let Some(start) = self
            .frames
            .iter()
            .position(|(m, t)| *m == module && t == token)
        {
            let mut path: Vec<String> = self.frames[start..]
                .iter()
                .map(|(_, t)| t.short_name().to_string())
                .collect();
            path.push(token.short_name().to_string());
            return Err(DiError::CircularDependency { path });
        }

        if self.frames.len() >= MAX_DEPTH {
            return Err(DiError::DepthExceeded(self.frames.len()));
        }

        let mut frames = Vec::with_capacity(self.frames.len() + 1);
        frames.extend(self.frames.iter().cloned());
        frames.push((module, token.clone()));
        Ok(ResolutionPath { frames })
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn cycle_reports_the_looping_segment_only() {
        let root = ModuleId(0);
        let path = ResolutionPath::new()
            .enter(root, &Token::symbol("Root"))
            .and_then(|p| p.enter(root, &Token::of::<A>()))
            .and_then(|p| p.enter(root, &Token::of::<B>()))
            .unwrap();

        match path.enter(root, &Token::of::<A>()) {
            Err(DiError::CircularDependency { path }) => {
                assert_eq!(path, vec!["A", "B", "A"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn same_token_in_other_module_is_not_a_cycle() {
        let path = ResolutionPath::new().enter(ModuleId(0), &Token::of::<A>()).unwrap();
        let nested = path.enter(ModuleId(1), &Token::of::<A>()).unwrap();
        assert_eq!(nested.depth(), 2);
    }
}
