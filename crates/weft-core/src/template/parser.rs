//! Template parser: token stream → node tree.

use super::lexer::{lex, BlockTag, Token, TokenKind};
use super::TemplateError;
use crate::types::Position;

/// A node of the parsed template tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateNode {
    Text {
        text: String,
        position: Position,
    },
    /// An expression, carried as an opaque string for the evaluator.
    Expr {
        source: String,
        position: Position,
    },
    For {
        var: String,
        iter: String,
        body: Vec<TemplateNode>,
        position: Position,
    },
    If {
        cond: String,
        body: Vec<TemplateNode>,
        elifs: Vec<ElifBranch>,
        else_body: Option<Vec<TemplateNode>>,
        position: Position,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElifBranch {
    pub cond: String,
    pub body: Vec<TemplateNode>,
}

/// Parses a template body into a node tree.
///
/// Recovery mirrors the lexer: on a mismatched close the token is
/// dropped, and blocks still open at end of input are closed there, so
/// a tree is always produced alongside the errors.
pub fn parse(body: &str) -> (Vec<TemplateNode>, Vec<TemplateError>) {
    let (tokens, mut errors) = lex(body);
    let mut parser = Parser {
        body,
        stack: vec![Frame::Root(Vec::new())],
        errors: &mut errors,
    };
    for token in tokens {
        parser.feed(token);
    }
    let nodes = parser.finish();
    (nodes, errors)
}

enum Frame {
    Root(Vec<TemplateNode>),
    For {
        var: String,
        iter: String,
        body: Vec<TemplateNode>,
        position: Position,
    },
    If {
        cond: String,
        body: Vec<TemplateNode>,
        elifs: Vec<ElifBranch>,
        else_body: Option<Vec<TemplateNode>>,
        /// Nodes of the branch currently being collected.
        current: Vec<TemplateNode>,
        state: IfState,
        position: Position,
    },
}

#[derive(Clone, Copy, PartialEq)]
enum IfState {
    Then,
    Elif,
    Else,
}

struct Parser<'a, 'e> {
    body: &'a str,
    stack: Vec<Frame>,
    errors: &'e mut Vec<TemplateError>,
}

impl Parser<'_, '_> {
    fn feed(&mut self, token: Token) {
        match token.kind {
            TokenKind::Text => {
                let text = self.body[token.span.start..token.span.end].to_string();
                self.push_node(TemplateNode::Text {
                    text,
                    position: token.position,
                });
            }
            TokenKind::Expr(source) => self.push_node(TemplateNode::Expr {
                source,
                position: token.position,
            }),
            TokenKind::Block(tag) => self.feed_tag(tag, token.position),
        }
    }

    fn feed_tag(&mut self, tag: BlockTag, position: Position) {
        match tag {
            BlockTag::For { var, iter } => self.stack.push(Frame::For {
                var,
                iter,
                body: Vec::new(),
                position,
            }),
            BlockTag::If(cond) => self.stack.push(Frame::If {
                cond,
                body: Vec::new(),
                elifs: Vec::new(),
                else_body: None,
                current: Vec::new(),
                state: IfState::Then,
                position,
            }),
            BlockTag::Elif(cond) => {
                let in_open_if = matches!(
                    self.stack.last(),
                    Some(Frame::If { state, .. }) if *state != IfState::Else
                );
                if !in_open_if {
                    self.unmatched("elif", position);
                    return;
                }
                self.seal_if_branch();
                if let Some(Frame::If { state, elifs, .. }) = self.stack.last_mut() {
                    *state = IfState::Elif;
                    elifs.push(ElifBranch {
                        cond,
                        body: Vec::new(),
                    });
                }
            }
            BlockTag::Else => {
                let in_open_if = matches!(
                    self.stack.last(),
                    Some(Frame::If { state, .. }) if *state != IfState::Else
                );
                if !in_open_if {
                    self.unmatched("else", position);
                    return;
                }
                self.seal_if_branch();
                if let Some(Frame::If {
                    state, else_body, ..
                }) = self.stack.last_mut()
                {
                    *state = IfState::Else;
                    *else_body = Some(Vec::new());
                }
            }
            BlockTag::EndFor => {
                if matches!(self.stack.last(), Some(Frame::For { .. })) {
                    self.close_top();
                } else {
                    self.unmatched("endfor", position);
                }
            }
            BlockTag::EndIf => {
                if matches!(self.stack.last(), Some(Frame::If { .. })) {
                    self.close_top();
                } else {
                    self.unmatched("endif", position);
                }
            }
        }
    }

    fn unmatched(&mut self, kind: &str, position: Position) {
        self.errors.push(TemplateError::UnmatchedBlock {
            kind: kind.to_string(),
            position,
        });
    }

    fn push_node(&mut self, node: TemplateNode) {
        match self.stack.last_mut() {
            Some(Frame::Root(nodes)) => nodes.push(node),
            Some(Frame::For { body, .. }) => body.push(node),
            Some(Frame::If { current, .. }) => current.push(node),
            None => unreachable!("parser stack never empties"),
        }
    }

    /// Moves the in-progress branch nodes into their slot on the if frame.
    fn seal_if_branch(&mut self) {
        if let Some(Frame::If {
            body,
            elifs,
            else_body,
            current,
            state,
            ..
        }) = self.stack.last_mut()
        {
            let nodes = std::mem::take(current);
            match state {
                IfState::Then => *body = nodes,
                IfState::Elif => {
                    if let Some(last) = elifs.last_mut() {
                        last.body = nodes;
                    }
                }
                IfState::Else => *else_body = Some(nodes),
            }
        }
    }

    fn close_top(&mut self) {
        self.seal_if_branch();
        let frame = self.stack.pop().expect("close_top called on open frame");
        let node = match frame {
            Frame::Root(_) => unreachable!("root frame is never closed"),
            Frame::For {
                var,
                iter,
                body,
                position,
            } => TemplateNode::For {
                var,
                iter,
                body,
                position,
            },
            Frame::If {
                cond,
                body,
                elifs,
                else_body,
                position,
                ..
            } => TemplateNode::If {
                cond,
                body,
                elifs,
                else_body,
                position,
            },
        };
        self.push_node(node);
    }

    fn finish(mut self) -> Vec<TemplateNode> {
        while self.stack.len() > 1 {
            let (kind, position) = match self.stack.last() {
                Some(Frame::For { position, .. }) => ("for", *position),
                Some(Frame::If { position, .. }) => ("if", *position),
                _ => break,
            };
            self.errors.push(TemplateError::UnmatchedBlock {
                kind: kind.to_string(),
                position,
            });
            self.close_top();
        }
        match self.stack.pop() {
            Some(Frame::Root(nodes)) => nodes,
            _ => unreachable!("root frame survives parsing"),
        }
    }
}
