use crate::op::{ExchangeKind, Op, OpVisitor, PlanNode, SortItem};
use sieve_expr::controlflow::{Branch, ControlFlow, Unbranch};
use sieve_expr::{Expr, FuncCall, Symbol};
use std::fmt::{self, Write};

const INDENT: usize = 4;
const BRANCH_1: char = '└';
const BRANCH_N: char = '├';
const BRANCH_V: char = '│';
const LINE: char = '─';

/// Explain defines how to explain an expression, an operator
/// or a plan.
pub trait Explain {
    fn explain<F: Write>(&self, f: &mut F) -> fmt::Result;
}

/// Explain the whole plan tree, one node per line.
impl Explain for PlanNode {
    fn explain<F: Write>(&self, f: &mut F) -> fmt::Result {
        let mut pe = PlanExplain { f, spans: vec![] };
        self.walk(&mut pe).unbranch()
    }
}

/* Implements Explain for all operators */

impl Explain for Op {
    fn explain<F: Write>(&self, f: &mut F) -> fmt::Result {
        match self {
            Op::Scan(scan) => {
                write!(f, "Scan{{{}, [", scan.table)?;
                write_refs(f, &scan.outputs, ", ")?;
                f.write_str("]}")
            }
            Op::Filt(filt) => {
                f.write_str("Filt{")?;
                filt.pred.explain(f)?;
                f.write_char('}')
            }
            Op::Proj(proj) => {
                f.write_str("Proj{")?;
                write_assigns(f, &proj.assignments, ", ")?;
                f.write_char('}')
            }
            Op::Join(join) => {
                write!(f, "Join{{{}", join.kind.to_lower())?;
                if !join.criteria.is_empty() {
                    f.write_str(", criteria=[")?;
                    write_refs(f, join.criteria.iter().map(|c| c.to_expr()), " and ")?;
                    f.write_char(']')?
                }
                f.write_char('}')
            }
            Op::SemiJoin(sj) => {
                write!(
                    f,
                    "SemiJoin{{{} = {}, output={}}}",
                    sj.source_join_symbol, sj.filtering_join_symbol, sj.output
                )
            }
            Op::Aggr(aggr) => {
                f.write_str("Aggr{")?;
                if !aggr.group_by.is_empty() {
                    f.write_str("group=[")?;
                    write_refs(f, &aggr.group_by, ", ")?;
                    f.write_str("], ")?;
                }
                f.write_str("aggrs=[")?;
                write_assigns(f, &aggr.aggrs, ", ")?;
                f.write_str("]}")
            }
            Op::Union(union) => {
                f.write_str("Union{")?;
                write_assigns(f, union.mapping.iter().map(|(k, v)| (k, SymbolList(v))), ", ")?;
                f.write_char('}')
            }
            Op::Exchange(exch) => {
                let kind = match exch.kind {
                    ExchangeKind::Gather => "gather",
                    ExchangeKind::Repartition => "repartition",
                    ExchangeKind::Replicate => "replicate",
                };
                write!(f, "Exchange{{{}", kind)?;
                if !exch.partition_keys.is_empty() {
                    f.write_str(", keys=[")?;
                    write_refs(f, &exch.partition_keys, ", ")?;
                    f.write_char(']')?
                }
                f.write_char('}')
            }
            Op::Unnest(unnest) => {
                f.write_str("Unnest{replicate=[")?;
                write_refs(f, &unnest.replicate, ", ")?;
                f.write_str("], unnest=[")?;
                write_assigns(f, unnest.unnest.iter().map(|(k, v)| (k, SymbolList(v))), ", ")?;
                f.write_char(']')?;
                if let Some(ord) = &unnest.ordinality {
                    write!(f, ", ordinality={}", ord)?
                }
                f.write_char('}')
            }
            Op::Sort(sort) => {
                f.write_str("Sort{")?;
                write_refs(f, &sort.items, ", ")?;
                f.write_char('}')
            }
            Op::Sample(sample) => write!(f, "Sample{{{}}}", sample.ratio.value()),
            Op::MarkDistinct(md) => {
                write!(f, "MarkDistinct{{{}, [", md.marker)?;
                write_refs(f, &md.distinct, ", ")?;
                f.write_str("]}")
            }
            Op::Values(values) => {
                f.write_str("Values{[")?;
                write_refs(f, &values.outputs, ", ")?;
                write!(f, "], rows={}}}", values.rows.len())
            }
            Op::Limit(limit) => write!(f, "Limit{{{}}}", limit.count),
            Op::Output(output) => {
                f.write_str("Output{")?;
                for (i, (name, sym)) in output.names.iter().zip(&output.outputs).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?
                    }
                    write!(f, "{}:={}", name, sym)?
                }
                f.write_char('}')
            }
        }
    }
}

impl Explain for SortItem {
    fn explain<F: Write>(&self, f: &mut F) -> fmt::Result {
        self.sym.explain(f)?;
        if self.desc {
            f.write_str(" desc")?
        }
        Ok(())
    }
}

/* Implements Explain for expressions */

impl Explain for Expr {
    #[inline]
    fn explain<F: Write>(&self, f: &mut F) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Explain for Symbol {
    #[inline]
    fn explain<F: Write>(&self, f: &mut F) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Explain for FuncCall {
    #[inline]
    fn explain<F: Write>(&self, f: &mut F) -> fmt::Result {
        write!(f, "{}", self)
    }
}

struct SymbolList<'a>(&'a [Symbol]);

impl Explain for SymbolList<'_> {
    fn explain<F: Write>(&self, f: &mut F) -> fmt::Result {
        f.write_char('[')?;
        write_refs(f, self.0, ", ")?;
        f.write_char(']')
    }
}

impl<T: Explain> Explain for &T {
    #[inline]
    fn explain<F: Write>(&self, f: &mut F) -> fmt::Result {
        (*self).explain(f)
    }
}

fn write_refs<F, E, I>(f: &mut F, exprs: I, delimiter: &str) -> fmt::Result
where
    F: Write,
    E: Explain,
    I: IntoIterator<Item = E>,
{
    let mut exprs = exprs.into_iter();
    if let Some(head) = exprs.next() {
        head.explain(f)?
    }
    for e in exprs {
        f.write_str(delimiter)?;
        e.explain(f)?
    }
    Ok(())
}

fn write_assigns<'a, F, E, I>(f: &mut F, assigns: I, delimiter: &str) -> fmt::Result
where
    F: Write,
    E: Explain,
    I: IntoIterator<Item = (&'a Symbol, E)>,
{
    for (i, (sym, e)) in assigns.into_iter().enumerate() {
        if i > 0 {
            f.write_str(delimiter)?
        }
        write!(f, "{}:=", sym)?;
        e.explain(f)?
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Span {
    Space(u16),
    Branch(u16, bool),
}

struct PlanExplain<'a, F> {
    f: &'a mut F,
    spans: Vec<Span>,
}

impl<F: Write> OpVisitor for PlanExplain<'_, F> {
    type Break = fmt::Error;
    #[inline]
    fn enter(&mut self, node: &PlanNode) -> ControlFlow<fmt::Error> {
        let child_cnt = node.sources().len();
        write_prefix(self.f, &self.spans).branch()?;
        // descendants are drawn under a vertical line if siblings follow
        if let Some(span) = self.spans.last_mut() {
            *span = match *span {
                Span::Branch(1, _) => Span::Space(INDENT as u16),
                Span::Branch(n, _) => Span::Branch(n - 1, true),
                s => s,
            }
        }
        if child_cnt > 0 {
            self.spans.push(Span::Branch(child_cnt as u16, false))
        }
        node.op.explain(self.f).branch()?;
        self.f.write_char('\n').branch()
    }

    #[inline]
    fn leave(&mut self, node: &PlanNode) -> ControlFlow<fmt::Error> {
        if !node.sources().is_empty() {
            let _ = self.spans.pop();
        }
        if let Some(Span::Branch(_, vertical)) = self.spans.last_mut() {
            *vertical = false
        }
        ControlFlow::Continue(())
    }
}

fn write_prefix<F: Write>(f: &mut F, spans: &[Span]) -> fmt::Result {
    for &span in spans {
        match span {
            Span::Space(n) => {
                for _ in 0..n {
                    f.write_char(' ')?
                }
            }
            Span::Branch(1, false) => {
                f.write_char(BRANCH_1)?;
                for _ in 1..INDENT {
                    f.write_char(LINE)?
                }
            }
            Span::Branch(_, false) => {
                f.write_char(BRANCH_N)?;
                for _ in 1..INDENT {
                    f.write_char(LINE)?
                }
            }
            Span::Branch(_, true) => {
                f.write_char(BRANCH_V)?;
                for _ in 1..INDENT {
                    f.write_char(' ')?
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::JoinKind;
    use crate::tests::build_plan;
    use sieve_expr::FuncCall;

    #[test]
    fn test_explain_plan() {
        build_plan(|b, t| {
            let l = b.scan(&t.t1, &t.t1_cols(&["a", "b"]))?;
            let l = b.filter(Expr::gt(Expr::col("b"), Expr::const_i64(1)), l)?;
            let r = b.scan(&t.t2, &t.t2_cols(&["x", "y"]))?;
            let join = b.join(JoinKind::Left, l, r, &[("a", "x")])?;
            let aggr = b.aggregate(
                &["a"],
                vec![("s", FuncCall::new("sum", vec![Expr::col("y")]))],
                join,
            )?;
            let limit = b.limit(10, aggr)?;
            let mut s = String::new();
            limit.explain(&mut s).unwrap();
            let expected = "\
Limit{10}
└───Aggr{group=[a], aggrs=[s:=sum(y)]}
    └───Join{left, criteria=[a = x]}
        ├───Filt{b > 1}
        │   └───Scan{mem.t1, [a, b]}
        └───Scan{mem.t2, [x, y]}
";
            assert_eq!(expected, s);
            let mut s = String::new();
            Expr::is_null(Expr::col("y")).explain(&mut s).unwrap();
            assert_eq!("y IS NULL", s);
            Ok(())
        })
    }
}
