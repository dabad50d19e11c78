//! AST builder: lowers a schedule tree to loop nests.
//!
//! Every statement domain is split into disjoint pieces and each piece is
//! scanned by its own [`ScanUnit`]. Walking the tree, a band member turns
//! into one `for` loop shared by the active units, a sequence into a block,
//! a filter narrows the active units and a leaf emits the remaining
//! dimension loops, the guards and the statement call.

use crate::codegen::ast::{AstCondition, AstExpr, AstNode};
use crate::codegen::scan::{LoopBounds, ScanUnit};
use crate::polyhedral::{AffineExpr, ConstraintSystem, Set};
use crate::schedule::{Band, ScheduleNode, ScheduleTree};
use crate::utils::errors::{PolyError, PolyResult, SchemaErrorKind};
use crate::utils::math;
use std::collections::{BTreeMap, HashMap};

/// Build the loop AST of `tree` for parameter values satisfying
/// `param_context` (a parameter-only set).
pub fn build_ast(tree: &ScheduleTree, param_context: &Set) -> PolyResult<AstNode> {
    AstBuilder::new(tree, param_context)?.build(tree)
}

/// Iterators bound on the current path.
#[derive(Debug, Clone, Default)]
struct Scope {
    iterators: Vec<String>,
    /// Iterators derived so far from each dimension
    derived: HashMap<String, usize>,
}

impl Scope {
    fn level(&self) -> usize {
        self.iterators.len()
    }

    fn is_taken(&self, name: &str, params: &[String]) -> bool {
        self.iterators.iter().any(|n| n == name) || params.iter().any(|p| p == name)
    }

    /// `preferred` if free, otherwise `c<level>`.
    fn fresh(&self, preferred: Option<&str>, params: &[String]) -> String {
        if let Some(name) = preferred {
            if !self.is_taken(name, params) {
                return name.to_string();
            }
        }
        let base = format!("c{}", self.level());
        let mut name = base.clone();
        let mut k = 0;
        while self.is_taken(&name, params) {
            k += 1;
            name = format!("{}_{}", base, k);
        }
        name
    }

    fn enter(&self, iterator: &str, source: Option<&str>) -> Scope {
        let mut inner = self.clone();
        inner.iterators.push(iterator.to_string());
        if let Some(dim) = source {
            *inner.derived.entry(dim.to_string()).or_insert(0) += 1;
        }
        inner
    }
}

/// Tree walker holding the scanning units of the whole domain.
pub struct AstBuilder {
    params: Vec<String>,
    units: Vec<ScanUnit>,
}

impl AstBuilder {
    /// Create the scanning units of `tree`'s domain under `param_context`.
    pub fn new(tree: &ScheduleTree, param_context: &Set) -> PolyResult<Self> {
        let domain = tree.domain().intersect_params(param_context)?;
        let context = param_context.align_params(&domain.params)?;
        let mut units = Vec::new();
        for (name, set) in domain.iter() {
            let assumed = assumed_system(&context, set.n_dim())?;
            for piece in set.make_disjoint()?.basic_sets() {
                if let Some(unit) = ScanUnit::new(name, piece, &assumed)? {
                    units.push(unit);
                }
            }
        }
        log::debug!(
            "building AST for {} statements in {} pieces",
            domain.len(),
            units.len()
        );
        Ok(Self {
            params: domain.params.clone(),
            units,
        })
    }

    /// Lower the tree.
    pub fn build(&self, tree: &ScheduleTree) -> PolyResult<AstNode> {
        self.build_node(tree.root_node(), self.units.clone(), &Scope::default())
    }

    fn build_node(&self, node: &ScheduleNode, units: Vec<ScanUnit>, scope: &Scope) -> PolyResult<AstNode> {
        if units.is_empty() {
            return Ok(AstNode::Block(Vec::new()));
        }
        match node {
            ScheduleNode::Domain { child, .. } => self.build_node(child, units, scope),
            ScheduleNode::Band { band, child } => self.build_member(band, 0, child, units, scope),
            ScheduleNode::Sequence { children } => {
                let mut out = Vec::new();
                for child in children {
                    let built = self.build_node(child, units.clone(), scope)?;
                    if !built.is_empty() {
                        out.push(built);
                    }
                }
                Ok(AstNode::block(out))
            }
            ScheduleNode::Filter { filter, child } => {
                let kept = units
                    .into_iter()
                    .filter(|u| filter.get(&u.statement).is_some())
                    .collect();
                self.build_node(child, kept, scope)
            }
            ScheduleNode::Leaf => {
                let mut out = Vec::new();
                for unit in units {
                    let built = self.build_leaf(unit, scope)?;
                    if !built.is_empty() {
                        out.push(built);
                    }
                }
                Ok(AstNode::block(out))
            }
        }
    }

    /// Loop for member `member` of `band`, with the remaining members and
    /// `child` inside.
    fn build_member(
        &self,
        band: &Band,
        member: usize,
        child: &ScheduleNode,
        mut units: Vec<ScanUnit>,
        scope: &Scope,
    ) -> PolyResult<AstNode> {
        if member == band.n_member() {
            return self.build_node(child, units, scope);
        }

        let mut values = Vec::with_capacity(units.len());
        let mut sources = Vec::with_capacity(units.len());
        for unit in units.iter_mut() {
            let map = band
                .partial
                .get(&unit.statement)
                .ok_or_else(|| {
                    PolyError::schema(
                        SchemaErrorKind::Statements,
                        format!("band has no schedule for statement '{}'", unit.statement),
                    )
                })?
                .align_params(&unit.param_names)?;
            let expr = &map.outputs[member];
            let dims: Vec<String> = expr
                .referenced_vars()
                .into_iter()
                .map(|d| unit.dim_names[d].clone())
                .collect();
            values.push(unit.member(expr)?);
            sources.push(dims);
        }

        // Scalar member: order the units by value, no loop.
        let constants: Option<Vec<i64>> = values.iter().map(AffineExpr::as_constant).collect();
        if let Some(constants) = constants {
            let mut groups: BTreeMap<i64, Vec<ScanUnit>> = BTreeMap::new();
            for (unit, value) in units.into_iter().zip(constants) {
                groups.entry(value).or_default().push(unit);
            }
            let mut out = Vec::new();
            for (_, group) in groups {
                let built = self.build_member(band, member + 1, child, group, scope)?;
                if !built.is_empty() {
                    out.push(built);
                }
            }
            return Ok(AstNode::block(out));
        }

        // Strip outer iterator terms shared by every unit.
        let split: Vec<_> = units
            .iter()
            .zip(&values)
            .map(|(u, v)| u.split_outer(v))
            .collect();
        let shifted = split.windows(2).all(|w| w[0].0 == w[1].0);
        let scanned: Vec<AffineExpr> = if shifted {
            split.into_iter().map(|(_, rest)| rest).collect()
        } else {
            values
        };
        let stride = if shifted {
            common_lattice(&units, &scanned)?
        } else {
            None
        };

        let source = match sources.split_first() {
            Some((first, rest)) if first.len() == 1 && rest.iter().all(|s| s == first) => Some(first[0].clone()),
            _ => None,
        };
        let preferred = source
            .as_ref()
            .map(|d| format!("{}{}", d, scope.derived.get(d).copied().unwrap_or(0)));
        let name = scope.fresh(preferred.as_deref(), &self.params);

        let mut live = Vec::new();
        for (mut unit, value) in units.into_iter().zip(&scanned) {
            let col = unit.add_iterator(&name, value)?;
            if let Some(bounds) = unit.loop_bounds(col)? {
                live.push((unit, col, bounds));
            }
        }
        if live.is_empty() {
            return Ok(AstNode::Block(Vec::new()));
        }

        let (mut lower, upper) = combine_bounds(&mut live)?;
        let step = match stride {
            Some((k, o)) => {
                for (unit, col, _) in live.iter_mut() {
                    unit.record_stride(*col, k, o);
                }
                lower = align_lower(lower, k, o)?;
                k
            }
            None => 1,
        };
        log::trace!("loop {} at level {} with stride {}", name, scope.level(), step);

        let inner = scope.enter(&name, source.as_deref());
        let units = live.into_iter().map(|(u, _, _)| u).collect();
        let body = self.build_member(band, member + 1, child, units, &inner)?;
        if body.is_empty() {
            return Ok(body);
        }
        Ok(AstNode::For {
            iterator: name,
            lower,
            upper,
            stride: step,
            body: Box::new(body),
        })
    }

    /// Loops over the dimensions no band determined, guards, and the call.
    fn build_leaf(&self, mut unit: ScanUnit, scope: &Scope) -> PolyResult<AstNode> {
        let mut divisibility = unit.settle()?;
        let mut scope = scope.clone();
        let mut loops = Vec::new();
        while let Some(col) = unit.next_free() {
            let name = scope.fresh(unit.dim_name(col), &self.params);
            unit.mark_iterator(col, &name);
            let bounds = match unit.loop_bounds(col)? {
                Some(bounds) => bounds,
                None => return Ok(AstNode::Block(Vec::new())),
            };
            for (_, c) in bounds.lower.iter().chain(&bounds.upper) {
                unit.add_context(c)?;
            }
            let lower = AstExpr::max_of(bounds.lower.into_iter().map(|(e, _)| e).collect());
            let upper = AstExpr::min_of(bounds.upper.into_iter().map(|(e, _)| e).collect());
            scope = scope.enter(&name, None);
            loops.push((name, lower, upper));
            divisibility.extend(unit.settle()?);
        }

        let mut conditions = unit.guards()?;
        conditions.extend(divisibility);
        let mut body = unit.call()?;
        if let Some(condition) = AstCondition::all(conditions) {
            body = AstNode::If {
                condition,
                body: Box::new(body),
            };
        }
        for (iterator, lower, upper) in loops.into_iter().rev() {
            body = AstNode::For {
                iterator,
                lower,
                upper,
                stride: 1,
                body: Box::new(body),
            };
        }
        Ok(body)
    }
}

/// Parameter constraints the code may assume, over `n_dim` dimensions.
///
/// Only a single-piece context can be assumed as a whole; a disjunctive
/// one is left to the guards.
fn assumed_system(context: &Set, n_dim: usize) -> PolyResult<ConstraintSystem> {
    let mut assumed = ConstraintSystem::new(n_dim, context.n_param());
    if let [piece] = context.basic_sets() {
        for c in piece.constraints.constraints() {
            let mut c = c.clone();
            c.expr.coeffs = vec![0; n_dim];
            assumed.add(c)?;
        }
        if piece.constraints.is_known_infeasible() {
            assumed.set_infeasible();
        }
    }
    Ok(assumed)
}

/// Stride and offset shared by every unit, if any.
fn common_lattice(units: &[ScanUnit], scanned: &[AffineExpr]) -> PolyResult<Option<(i64, i64)>> {
    let mut common = None;
    for (unit, value) in units.iter().zip(scanned) {
        let lattice = match unit.lattice(value)? {
            Some(l) => l,
            None => return Ok(None),
        };
        match common {
            None => common = Some(lattice),
            Some(c) if c == lattice => {}
            Some(_) => return Ok(None),
        }
    }
    Ok(common)
}

/// Loop bounds spanning every unit. Bounds that every unit shares, and
/// folded constant bounds, are recorded in the units' contexts.
fn combine_bounds(live: &mut [(ScanUnit, usize, LoopBounds)]) -> PolyResult<(AstExpr, AstExpr)> {
    let lower = AstExpr::min_of(
        live.iter()
            .map(|(_, _, b)| AstExpr::max_of(b.lower.iter().map(|(e, _)| e.clone()).collect()))
            .collect(),
    );
    let upper = AstExpr::max_of(
        live.iter()
            .map(|(_, _, b)| AstExpr::min_of(b.upper.iter().map(|(e, _)| e.clone()).collect()))
            .collect(),
    );

    let mut recorded = Vec::new();
    for (i, (_, _, b)) in live.iter().enumerate() {
        for (e, c) in &b.lower {
            if live.iter().all(|(_, _, o)| o.lower.iter().any(|(x, _)| x == e)) {
                recorded.push((i, c.clone()));
            }
        }
        for (e, c) in &b.upper {
            if live.iter().all(|(_, _, o)| o.upper.iter().any(|(x, _)| x == e)) {
                recorded.push((i, c.clone()));
            }
        }
    }
    for (i, c) in recorded {
        live[i].0.add_context(&c)?;
    }
    for (unit, col, _) in live.iter_mut() {
        if let Some(v) = lower.as_constant() {
            unit.add_context_bound(*col, v, true)?;
        }
        if let Some(v) = upper.as_constant() {
            unit.add_context_bound(*col, v, false)?;
        }
    }
    Ok((lower, upper))
}

/// Smallest value `>= lower` that is `o` modulo `k`.
fn align_lower(lower: AstExpr, k: i64, o: i64) -> PolyResult<AstExpr> {
    if let Some(v) = lower.as_constant() {
        let aligned = math::mul_add(k, math::ceil_div(math::sub(v, o)?, k)?, o)?;
        return Ok(AstExpr::int(aligned));
    }
    let shifted = offset(lower, -o);
    let aligned = AstExpr::CeilDiv(Box::new(shifted), k).mul(k);
    Ok(offset(aligned, o))
}

fn offset(e: AstExpr, c: i64) -> AstExpr {
    if c == 0 {
        return e;
    }
    match e {
        AstExpr::Linear { terms, constant } => AstExpr::linear(terms, constant.saturating_add(c)),
        other => other.add(AstExpr::int(c)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedral::{Space, UnionMap, UnionSet};
    use crate::transform::tile_band;

    fn universe() -> Set {
        Set::universe(Space::params(Vec::new()))
    }

    fn tree(domain: &str, schedule: Option<&str>) -> ScheduleTree {
        let domain: UnionSet = domain.parse().unwrap();
        let tree = ScheduleTree::from_domain(domain);
        match schedule {
            Some(s) => tree.insert_band(&s.parse::<UnionMap>().unwrap()).unwrap(),
            None => tree,
        }
    }

    fn loop_header(node: &AstNode) -> (String, AstExpr, AstExpr, i64) {
        match node {
            AstNode::For {
                iterator,
                lower,
                upper,
                stride,
                ..
            } => (iterator.clone(), lower.clone(), upper.clone(), *stride),
            other => panic!("expected a loop, got {:?}", other),
        }
    }

    #[test]
    fn test_leaf_loop_uses_dimension_name() {
        let t = tree("{ S[i] : 0 <= i < 5 }", None);
        let ast = build_ast(&t, &universe()).unwrap();
        let (name, lower, upper, stride) = loop_header(&ast);
        assert_eq!(name, "i");
        assert_eq!(lower, AstExpr::int(0));
        assert_eq!(upper, AstExpr::int(4));
        assert_eq!(stride, 1);
    }

    #[test]
    fn test_tiled_loops() {
        let t = tree("{ S[i] : 0 <= i < 10 }", Some("{ S[i] -> [i] }"));
        let band = t.first_band().unwrap();
        let tiled = tile_band(&t, &band, &[4]).unwrap();
        let ast = build_ast(&tiled, &universe()).unwrap();
        let (outer, lo, hi, _) = loop_header(&ast);
        assert_eq!((outer.as_str(), lo, hi), ("i0", AstExpr::int(0), AstExpr::int(2)));

        let calls: Vec<i64> = ast
            .calls(&HashMap::new())
            .unwrap()
            .into_iter()
            .map(|(_, args)| args[0])
            .collect();
        assert_eq!(calls, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_scalar_member_orders_statements() {
        let t = tree(
            "{ S[i] : 0 <= i < 3; T[i] : 0 <= i < 3 }",
            Some("{ S[i] -> [1, i]; T[i] -> [0, i] }"),
        );
        let ast = build_ast(&t, &universe()).unwrap();
        let names: Vec<String> = ast
            .calls(&HashMap::new())
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, vec!["T", "T", "T", "S", "S", "S"]);
    }

    #[test]
    fn test_shared_loop_guards_each_statement() {
        let t = tree(
            "{ S[i] : 0 <= i < 10; T[i] : 5 <= i < 20 }",
            Some("{ S[i] -> [i]; T[i] -> [i] }"),
        );
        let ast = build_ast(&t, &universe()).unwrap();
        let (_, lo, hi, _) = loop_header(&ast);
        assert_eq!(lo, AstExpr::int(0));
        assert_eq!(hi, AstExpr::int(19));
        let calls = ast.calls(&HashMap::new()).unwrap();
        assert_eq!(calls.len(), 25);
        assert_eq!(calls.iter().filter(|(n, _)| n == "S").count(), 10);
    }

    #[test]
    fn test_parametric_bounds() {
        let t = tree("[n] -> { S[i] : 0 <= i < n }", Some("{ S[i] -> [i] }"));
        let ast = build_ast(&t, &universe()).unwrap();
        let (_, _, hi, _) = loop_header(&ast);
        assert_eq!(hi, AstExpr::linear(vec![(1, "n".to_string())], -1));
        let params: HashMap<String, i64> = [("n".to_string(), 4)].into_iter().collect();
        assert_eq!(ast.calls(&params).unwrap().len(), 4);
    }

    #[test]
    fn test_context_fixes_parameter() {
        let t = tree("[n] -> { S[i] : 0 <= i < n }", None);
        let context: Set = "[n] -> { : n = 3 }".parse().unwrap();
        let ast = build_ast(&t, &context).unwrap();
        let (_, _, hi, _) = loop_header(&ast);
        assert_eq!(hi, AstExpr::int(2));
    }

    #[test]
    fn test_parameter_only_constraint_is_guarded() {
        let t = tree("[n] -> { S[i] : 0 <= i < 10 and n >= 5 }", None);
        let ast = build_ast(&t, &universe()).unwrap();
        assert!(matches!(
            ast,
            AstNode::For { ref body, .. } if matches!(**body, AstNode::If { .. })
        ));

        let assumed: Set = "[n] -> { : n >= 5 }".parse().unwrap();
        let ast = build_ast(&t, &assumed).unwrap();
        assert!(matches!(
            ast,
            AstNode::For { ref body, .. } if matches!(**body, AstNode::Call { .. })
        ));
    }

    #[test]
    fn test_unbounded_domain() {
        let t = tree("{ S[i] : i >= 0 }", Some("{ S[i] -> [i] }"));
        assert!(matches!(build_ast(&t, &universe()), Err(PolyError::UnboundedDomain(_))));
    }
}
