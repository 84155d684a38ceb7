//! XPath evaluator over instance data trees

use std::collections::HashMap;

use once_cell::unsync::OnceCell;

use crate::error::{Error, Result};
use crate::schema::types::Pattern;

use super::parsers::{Axis, BinaryOp, Expr, NodeTest, Step};
use super::{EvalContext, NamespaceMap, XNode, XPathValue};

#[derive(Clone, Copy)]
struct Focus {
    node: XNode,
    position: usize,
    size: usize,
}

pub(crate) struct Evaluator<'a, 'b> {
    ctx: &'b EvalContext<'a>,
    namespaces: &'b NamespaceMap,
    order: OnceCell<HashMap<XNode, usize>>,
}

impl<'a, 'b> Evaluator<'a, 'b> {
    pub(crate) fn new(ctx: &'b EvalContext<'a>, namespaces: &'b NamespaceMap) -> Self {
        Self {
            ctx,
            namespaces,
            order: OnceCell::new(),
        }
    }

    pub(crate) fn evaluate(&self, expr: &Expr) -> Result<XPathValue> {
        let node = self.ctx.node.map(XNode::Data).unwrap_or(XNode::Root);
        self.eval(
            expr,
            Focus {
                node,
                position: 1,
                size: 1,
            },
        )
    }

    // =========================================================================
    // Tree navigation
    // =========================================================================

    fn children(&self, node: XNode) -> Vec<XNode> {
        match node {
            XNode::Root => self.ctx.tree.roots().iter().map(|&id| XNode::Data(id)).collect(),
            XNode::Data(id) => self
                .ctx
                .tree
                .node(id)
                .children
                .iter()
                .map(|&c| XNode::Data(c))
                .collect(),
        }
    }

    fn parent(&self, node: XNode) -> Option<XNode> {
        match node {
            XNode::Root => None,
            XNode::Data(id) => Some(
                self.ctx
                    .tree
                    .node(id)
                    .parent
                    .map(XNode::Data)
                    .unwrap_or(XNode::Root),
            ),
        }
    }

    fn siblings(&self, node: XNode) -> Vec<XNode> {
        match self.parent(node) {
            Some(parent) => self.children(parent),
            None => Vec::new(),
        }
    }

    fn descendants(&self, node: XNode, out: &mut Vec<XNode>) {
        for child in self.children(node) {
            out.push(child);
            self.descendants(child, out);
        }
    }

    fn document_order(&self) -> &HashMap<XNode, usize> {
        self.order.get_or_init(|| {
            let mut all = vec![XNode::Root];
            self.descendants(XNode::Root, &mut all);
            all.into_iter().enumerate().map(|(i, n)| (n, i)).collect()
        })
    }

    fn sort_unique(&self, nodes: &mut Vec<XNode>) {
        let order = self.document_order();
        nodes.sort_by_key(|n| order.get(n).copied().unwrap_or(usize::MAX));
        nodes.dedup();
    }

    fn matches(&self, node: XNode, test: &NodeTest) -> bool {
        let XNode::Data(id) = node else {
            return matches!(test, NodeTest::Node);
        };
        let schema = self.ctx.schema.node(self.ctx.tree.node(id).schema);
        let module_name = &self.ctx.schema.module(schema.module).name;
        match test {
            NodeTest::Node => true,
            NodeTest::Text => false,
            NodeTest::Wildcard { module } => module.as_ref().map_or(true, |m| m == module_name),
            NodeTest::Name { module, local } => {
                let expected = match module {
                    Some(m) => m.as_str(),
                    None => self.ctx.schema.module(self.ctx.default_module).name.as_str(),
                };
                schema.name == *local && module_name == expected
            }
        }
    }

    fn string_value(&self, node: XNode) -> String {
        if let XNode::Data(id) = node {
            if let Some(value) = &self.ctx.tree.node(id).value {
                return value.clone();
            }
        }
        let mut out = String::new();
        for child in self.children(node) {
            out.push_str(&self.string_value(child));
        }
        out
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn eval(&self, expr: &Expr, focus: Focus) -> Result<XPathValue> {
        match expr {
            Expr::Literal(s) => Ok(XPathValue::String(s.clone())),
            Expr::Number(n) => Ok(XPathValue::Number(*n)),
            Expr::Negate(inner) => {
                let value = self.eval(inner, focus)?;
                Ok(XPathValue::Number(-self.to_number(&value)))
            }
            Expr::Binary(op, left, right) => self.eval_binary(*op, left, right, focus),
            Expr::Function(name, args) => self.eval_function(name, args, focus),
            Expr::Path { absolute, steps } => {
                let start = if *absolute { XNode::Root } else { focus.node };
                let nodes = self.eval_steps(vec![start], steps)?;
                Ok(XPathValue::Nodes(nodes))
            }
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let mut nodes = match self.eval(primary, focus)? {
                    XPathValue::Nodes(nodes) => nodes,
                    value if predicates.is_empty() && steps.is_empty() => return Ok(value),
                    _ => {
                        return Err(Error::XPath(
                            "Predicates and steps require a node set".to_string(),
                        ))
                    }
                };
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                Ok(XPathValue::Nodes(self.eval_steps(nodes, steps)?))
            }
        }
    }

    fn eval_steps(&self, mut nodes: Vec<XNode>, steps: &[Step]) -> Result<Vec<XNode>> {
        for step in steps {
            let mut next = Vec::new();
            for &node in &nodes {
                let candidates: Vec<XNode> = self
                    .axis_nodes(node, step.axis)
                    .into_iter()
                    .filter(|n| self.matches(*n, &step.test))
                    .collect();
                let mut selected = candidates;
                for predicate in &step.predicates {
                    selected = self.filter(selected, predicate)?;
                }
                next.extend(selected);
            }
            self.sort_unique(&mut next);
            nodes = next;
        }
        Ok(nodes)
    }

    fn axis_nodes(&self, node: XNode, axis: Axis) -> Vec<XNode> {
        match axis {
            Axis::Child => self.children(node),
            Axis::SelfAxis => vec![node],
            Axis::Parent => self.parent(node).into_iter().collect(),
            Axis::Descendant => {
                let mut out = Vec::new();
                self.descendants(node, &mut out);
                out
            }
            Axis::DescendantOrSelf => {
                let mut out = vec![node];
                self.descendants(node, &mut out);
                out
            }
            Axis::Ancestor | Axis::AncestorOrSelf => {
                let mut out = Vec::new();
                if axis == Axis::AncestorOrSelf {
                    out.push(node);
                }
                let mut current = self.parent(node);
                while let Some(p) = current {
                    out.push(p);
                    current = self.parent(p);
                }
                out
            }
            Axis::FollowingSibling => {
                let siblings = self.siblings(node);
                match siblings.iter().position(|s| *s == node) {
                    Some(i) => siblings[i + 1..].to_vec(),
                    None => Vec::new(),
                }
            }
            Axis::PrecedingSibling => {
                let siblings = self.siblings(node);
                match siblings.iter().position(|s| *s == node) {
                    Some(i) => siblings[..i].iter().rev().copied().collect(),
                    None => Vec::new(),
                }
            }
        }
    }

    fn filter(&self, nodes: Vec<XNode>, predicate: &Expr) -> Result<Vec<XNode>> {
        let size = nodes.len();
        let mut out = Vec::new();
        for (i, node) in nodes.into_iter().enumerate() {
            let focus = Focus {
                node,
                position: i + 1,
                size,
            };
            let keep = match self.eval(predicate, focus)? {
                XPathValue::Number(n) => n == (i + 1) as f64,
                other => other.is_truthy(),
            };
            if keep {
                out.push(node);
            }
        }
        Ok(out)
    }

    fn eval_binary(&self, op: BinaryOp, left: &Expr, right: &Expr, focus: Focus) -> Result<XPathValue> {
        match op {
            BinaryOp::Or => {
                if self.eval(left, focus)?.is_truthy() {
                    return Ok(XPathValue::Boolean(true));
                }
                Ok(XPathValue::Boolean(self.eval(right, focus)?.is_truthy()))
            }
            BinaryOp::And => {
                if !self.eval(left, focus)?.is_truthy() {
                    return Ok(XPathValue::Boolean(false));
                }
                Ok(XPathValue::Boolean(self.eval(right, focus)?.is_truthy()))
            }
            BinaryOp::Union => {
                let l = self.eval(left, focus)?;
                let r = self.eval(right, focus)?;
                match (l, r) {
                    (XPathValue::Nodes(mut a), XPathValue::Nodes(b)) => {
                        a.extend(b);
                        self.sort_unique(&mut a);
                        Ok(XPathValue::Nodes(a))
                    }
                    _ => Err(Error::XPath("Union operands must be node sets".to_string())),
                }
            }
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                let l = self.eval(left, focus)?;
                let r = self.eval(right, focus)?;
                Ok(XPathValue::Boolean(self.compare(op, &l, &r)))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let l = self.to_number(&self.eval(left, focus)?);
                let r = self.to_number(&self.eval(right, focus)?);
                Ok(XPathValue::Number(match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    _ => l % r,
                }))
            }
        }
    }

    fn compare(&self, op: BinaryOp, left: &XPathValue, right: &XPathValue) -> bool {
        match (left, right) {
            (XPathValue::Nodes(a), XPathValue::Nodes(b)) => a.iter().any(|x| {
                let xs = self.string_value(*x);
                b.iter()
                    .any(|y| compare_atoms(op, &Atom::Str(xs.clone()), &Atom::Str(self.string_value(*y))))
            }),
            (XPathValue::Nodes(nodes), other) => self.compare_set(op, nodes, other, false),
            (other, XPathValue::Nodes(nodes)) => self.compare_set(op, nodes, other, true),
            (l, r) => compare_atoms(op, &self.atom(l), &self.atom(r)),
        }
    }

    fn compare_set(&self, op: BinaryOp, nodes: &[XNode], other: &XPathValue, swapped: bool) -> bool {
        if let XPathValue::Boolean(b) = other {
            let set = Atom::Bool(!nodes.is_empty());
            let other = Atom::Bool(*b);
            return if swapped {
                compare_atoms(op, &other, &set)
            } else {
                compare_atoms(op, &set, &other)
            };
        }
        let other_atom = self.atom(other);
        nodes.iter().any(|n| {
            let s = self.string_value(*n);
            let atom = match other {
                XPathValue::Number(_) => Atom::Num(parse_number(&s)),
                _ => Atom::Str(s),
            };
            if swapped {
                compare_atoms(op, &other_atom, &atom)
            } else {
                compare_atoms(op, &atom, &other_atom)
            }
        })
    }

    fn atom(&self, value: &XPathValue) -> Atom {
        match value {
            XPathValue::Boolean(b) => Atom::Bool(*b),
            XPathValue::Number(n) => Atom::Num(*n),
            XPathValue::String(s) => Atom::Str(s.clone()),
            XPathValue::Nodes(_) => Atom::Str(self.to_string(value)),
        }
    }

    fn to_string(&self, value: &XPathValue) -> String {
        match value {
            XPathValue::String(s) => s.clone(),
            XPathValue::Boolean(b) => b.to_string(),
            XPathValue::Number(n) => format_number(*n),
            XPathValue::Nodes(nodes) => nodes
                .first()
                .map(|n| self.string_value(*n))
                .unwrap_or_default(),
        }
    }

    fn to_number(&self, value: &XPathValue) -> f64 {
        match value {
            XPathValue::Number(n) => *n,
            XPathValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            other => parse_number(&self.to_string(other)),
        }
    }

    // =========================================================================
    // Functions
    // =========================================================================

    fn arg(&self, args: &[Expr], index: usize, focus: Focus) -> Result<XPathValue> {
        match args.get(index) {
            Some(expr) => self.eval(expr, focus),
            None => Ok(XPathValue::Nodes(vec![focus.node])),
        }
    }

    fn check_arity(name: &str, args: &[Expr], min: usize, max: usize) -> Result<()> {
        if args.len() < min || args.len() > max {
            return Err(Error::XPath(format!(
                "Function {}() called with {} arguments",
                name,
                args.len()
            )));
        }
        Ok(())
    }

    fn eval_function(&self, name: &str, args: &[Expr], focus: Focus) -> Result<XPathValue> {
        match name {
            "current" => {
                Self::check_arity(name, args, 0, 0)?;
                let node = self.ctx.current.map(XNode::Data).unwrap_or(XNode::Root);
                Ok(XPathValue::Nodes(vec![node]))
            }
            "position" => Ok(XPathValue::Number(focus.position as f64)),
            "last" => Ok(XPathValue::Number(focus.size as f64)),
            "true" => Ok(XPathValue::Boolean(true)),
            "false" => Ok(XPathValue::Boolean(false)),
            "not" => {
                Self::check_arity(name, args, 1, 1)?;
                Ok(XPathValue::Boolean(!self.eval(&args[0], focus)?.is_truthy()))
            }
            "boolean" => {
                Self::check_arity(name, args, 1, 1)?;
                Ok(XPathValue::Boolean(self.eval(&args[0], focus)?.is_truthy()))
            }
            "count" => {
                Self::check_arity(name, args, 1, 1)?;
                match self.eval(&args[0], focus)? {
                    XPathValue::Nodes(nodes) => Ok(XPathValue::Number(nodes.len() as f64)),
                    _ => Err(Error::XPath("count() requires a node set".to_string())),
                }
            }
            "string" => {
                Self::check_arity(name, args, 0, 1)?;
                Ok(XPathValue::String(self.to_string(&self.arg(args, 0, focus)?)))
            }
            "number" => {
                Self::check_arity(name, args, 0, 1)?;
                Ok(XPathValue::Number(self.to_number(&self.arg(args, 0, focus)?)))
            }
            "string-length" => {
                Self::check_arity(name, args, 0, 1)?;
                let s = self.to_string(&self.arg(args, 0, focus)?);
                Ok(XPathValue::Number(s.chars().count() as f64))
            }
            "normalize-space" => {
                Self::check_arity(name, args, 0, 1)?;
                let s = self.to_string(&self.arg(args, 0, focus)?);
                Ok(XPathValue::String(s.split_whitespace().collect::<Vec<_>>().join(" ")))
            }
            "concat" => {
                let mut out = String::new();
                for a in args {
                    out.push_str(&self.to_string(&self.eval(a, focus)?));
                }
                Ok(XPathValue::String(out))
            }
            "contains" | "starts-with" => {
                Self::check_arity(name, args, 2, 2)?;
                let s = self.to_string(&self.eval(&args[0], focus)?);
                let t = self.to_string(&self.eval(&args[1], focus)?);
                Ok(XPathValue::Boolean(if name == "contains" {
                    s.contains(&t)
                } else {
                    s.starts_with(&t)
                }))
            }
            "re-match" => {
                Self::check_arity(name, args, 2, 2)?;
                let s = self.to_string(&self.eval(&args[0], focus)?);
                let p = self.to_string(&self.eval(&args[1], focus)?);
                let pattern = Pattern::new(&p, false).map_err(|e| Error::XPath(e.message))?;
                Ok(XPathValue::Boolean(pattern.matches(&s)))
            }
            "bit-is-set" => {
                Self::check_arity(name, args, 2, 2)?;
                let s = self.to_string(&self.eval(&args[0], focus)?);
                let bit = self.to_string(&self.eval(&args[1], focus)?);
                Ok(XPathValue::Boolean(s.split_whitespace().any(|b| b == bit)))
            }
            "derived-from" | "derived-from-or-self" => {
                Self::check_arity(name, args, 2, 2)?;
                let nodes = match self.eval(&args[0], focus)? {
                    XPathValue::Nodes(nodes) => nodes,
                    _ => return Err(Error::XPath(format!("{}() requires a node set", name))),
                };
                let identity = self.to_string(&self.eval(&args[1], focus)?);
                self.derived_from(&nodes, &identity, name == "derived-from-or-self")
            }
            _ => Err(Error::XPath(format!("Unsupported function {}()", name))),
        }
    }

    fn derived_from(&self, nodes: &[XNode], identity: &str, or_self: bool) -> Result<XPathValue> {
        let schema = self.ctx.schema;
        let (module, local) = match identity.split_once(':') {
            Some((prefix, local)) => {
                let module = self.namespaces.get(prefix).ok_or_else(|| {
                    Error::XPath(format!("Unknown prefix '{}' in identity '{}'", prefix, identity))
                })?;
                (module.clone(), local)
            }
            None => (schema.module(self.ctx.default_module).name.clone(), identity),
        };
        let Some(base) = schema.find_identity(&module, local) else {
            return Err(Error::XPath(format!("Unknown identity '{}'", identity)));
        };

        for node in nodes {
            let XNode::Data(id) = node else { continue };
            let data = self.ctx.tree.node(*id);
            let Some(value) = &data.value else { continue };
            let (value_module, value_name) = match value.split_once(':') {
                Some((m, n)) => (m.to_string(), n),
                None => (schema.module(schema.node(data.schema).module).name.clone(), value.as_str()),
            };
            if let Some(ident) = schema.find_identity(&value_module, value_name) {
                if (or_self && ident == base) || schema.is_derived_from(ident, base) {
                    return Ok(XPathValue::Boolean(true));
                }
            }
        }
        Ok(XPathValue::Boolean(false))
    }
}

enum Atom {
    Bool(bool),
    Num(f64),
    Str(String),
}

fn compare_atoms(op: BinaryOp, left: &Atom, right: &Atom) -> bool {
    let as_num = |a: &Atom| match a {
        Atom::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Atom::Num(n) => *n,
        Atom::Str(s) => parse_number(s),
    };
    match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (left, right) {
                (Atom::Bool(_), _) | (_, Atom::Bool(_)) => {
                    let lb = match left {
                        Atom::Bool(b) => *b,
                        Atom::Num(n) => *n != 0.0 && !n.is_nan(),
                        Atom::Str(s) => !s.is_empty(),
                    };
                    let rb = match right {
                        Atom::Bool(b) => *b,
                        Atom::Num(n) => *n != 0.0 && !n.is_nan(),
                        Atom::Str(s) => !s.is_empty(),
                    };
                    lb == rb
                }
                (Atom::Num(_), _) | (_, Atom::Num(_)) => as_num(left) == as_num(right),
                (Atom::Str(a), Atom::Str(b)) => a == b,
            };
            (op == BinaryOp::Eq) == equal
        }
        BinaryOp::Lt => as_num(left) < as_num(right),
        BinaryOp::Le => as_num(left) <= as_num(right),
        BinaryOp::Gt => as_num(left) > as_num(right),
        BinaryOp::Ge => as_num(left) >= as_num(right),
        _ => false,
    }
}

fn parse_number(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(f64::NAN)
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
