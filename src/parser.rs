use crate::{
    ast::{
        AggregationOp, BoolOp, BoundaryOp, BoundsOp, CompareOp, Constant, ConversionOp, EditAction,
        EditRule, Expr, FilterRule, FunnelType, MatchDefinition, MembershipOp, NullTestOp,
        ParameterDefinition, PathAccessor, Query, SampleRule, Segment, SegmentDefinition, Select,
        Source, Statement, Statements, StepDefinition, Target, TimeOp, Token, UnaryValueOp,
        ValueOp, View,
        expressions::{
            Aggregation, BinaryValue, BooleanValue, BoundaryBoolean, BoundsTest, Cast,
            DateTimeConversion, DateTimeQuantum, ExplicitMembership, FunctionCall, Now, NullTest,
            ParameterAccessor, UnaryValue, ValueComparison, VectorMembership,
        },
        statements::{
            Funnel, MatchBracket, MatchList, MatchOp, MatchRepeat, MatchStep, SchemaSource,
            StatementSource,
        },
    },
    config::DEFAULT_MAX_DEPTH,
    datatype::DataType,
    error::{Location, MotifError, Result},
    lexer::Lexer,
    schema::{Classifier, FieldDecl, FieldType, MotifSchema, SchemaDecl, StructureDecl},
};
use chrono::FixedOffset;
use std::collections::VecDeque;
use std::mem;

pub struct Parser {
    lexer: Lexer,
    current_token: Token,
    location: Location,
    lookahead: VecDeque<(Token, Location)>,
    depth: usize,
    /// Operands appended by the enclosing binary operator chains; each one
    /// nests the tree a level deeper without recursing.
    chain: usize,
    max_depth: usize,
    /// Depth of a bare select target, where a trailing `where` belongs to
    /// the select rather than to an aggregation.
    target_depth: Option<usize>,
}

/// Parse and build a schema from its text form.
pub fn parse_schema(text: &str) -> Result<MotifSchema> {
    let mut parser = Parser::new(text)?;
    let decl = parser.parse_schema_decl()?;
    parser.finish()?;
    MotifSchema::build(&decl)
}

impl Parser {
    pub fn new(input: &str) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token()?;
        let location = lexer.location();
        Ok(Parser {
            lexer,
            current_token,
            location,
            lookahead: VecDeque::new(),
            depth: 0,
            chain: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            target_depth: None,
        })
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn advance(&mut self) -> Result<()> {
        let (token, location) = match self.lookahead.pop_front() {
            Some(next) => next,
            None => (self.lexer.next_token()?, self.lexer.location()),
        };
        self.current_token = token;
        self.location = location;
        Ok(())
    }

    /// The token `n` places after the current one.
    fn peek(&mut self, n: usize) -> Result<&Token> {
        while self.lookahead.len() < n {
            let token = self.lexer.next_token()?;
            self.lookahead.push_back((token, self.lexer.location()));
        }
        Ok(&self.lookahead[n - 1].0)
    }

    fn error(&self, message: impl Into<String>) -> MotifError {
        MotifError::parse(self.location, message)
    }

    fn unexpected(&self, expected: &str) -> MotifError {
        self.error(format!("expected {expected}, found '{}'", self.current_token))
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if !self.check(&expected) {
            return Err(self.unexpected(&format!("'{expected}'")));
        }
        self.advance()
    }

    fn check(&self, token: &Token) -> bool {
        mem::discriminant(&self.current_token) == mem::discriminant(token)
    }

    fn check_word(&self, word: &str) -> bool {
        self.current_token.is_word(word)
    }

    fn eat(&mut self, token: Token) -> Result<bool> {
        if self.check(&token) {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn eat_word(&mut self, word: &str) -> Result<bool> {
        if self.check_word(word) {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect_word(&mut self, word: &str) -> Result<()> {
        if !self.check_word(word) {
            return Err(self.unexpected(&format!("'{}'", word.to_ascii_uppercase())));
        }
        self.advance()
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth + self.chain > self.max_depth {
            return Err(self.error("expression too deep"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Charge one more operand of a left-deep operator chain.
    fn extend_chain(&mut self) -> Result<()> {
        self.chain += 1;
        if self.depth + self.chain > self.max_depth {
            return Err(self.error("expression too deep"));
        }
        Ok(())
    }

    /// Run an operator chain, releasing its charged operands on exit.
    fn chained(&mut self, f: impl FnOnce(&mut Self) -> Result<Expr>) -> Result<Expr> {
        let base = self.chain;
        let expr = f(self);
        self.chain = base;
        expr
    }

    /// Fail unless all input has been consumed.
    pub fn finish(&mut self) -> Result<()> {
        if self.check(&Token::Eof) {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    /// A bare or quoted name.
    fn parse_name(&mut self, what: &str) -> Result<String> {
        match mem::replace(&mut self.current_token, Token::Eof) {
            Token::Identifier(name) | Token::String(name) => {
                self.advance()?;
                Ok(name)
            }
            token => {
                self.current_token = token;
                Err(self.unexpected(what))
            }
        }
    }

    fn parse_integer(&mut self, what: &str) -> Result<i64> {
        let negative = self.eat(Token::Minus)?;
        match self.current_token {
            Token::Integer(n) => {
                self.advance()?;
                Ok(if negative { -n } else { n })
            }
            _ => Err(self.unexpected(what)),
        }
    }

    // ------------------------------------------------------------------------
    // Schemas
    // ------------------------------------------------------------------------

    pub fn parse_schema_decl(&mut self) -> Result<SchemaDecl> {
        let location = self.location;
        self.expect_word("schema")?;
        let name = self.parse_name("a schema name")?;
        self.expect(Token::LBrace)?;

        let mut version = 1;
        let mut root = None;
        let mut structures = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.eat_word("version")? {
                self.expect(Token::Colon)?;
                version = u32::try_from(self.parse_integer("a version number")?)
                    .map_err(|_| self.error("schema version must be a positive integer"))?;
            } else if self.eat_word("root")? {
                self.expect(Token::RParen)?;
                let field = self.parse_name("a root field name")?;
                self.expect(Token::Colon)?;
                let rtype = self.parse_name("a root structure name")?;
                root = Some((field, rtype));
            } else if self.check_word("structure") {
                structures.push(self.parse_structure_decl()?);
            } else {
                return Err(self.unexpected("'version', 'root' or 'structure'"));
            }
        }
        self.expect(Token::RBrace)?;

        let (root_field, root_type) =
            root.ok_or_else(|| MotifError::parse(location, format!("schema '{name}' has no root field")))?;
        Ok(SchemaDecl {
            name,
            version,
            root_field,
            root_type,
            structures,
            location,
        })
    }

    fn parse_structure_decl(&mut self) -> Result<StructureDecl> {
        let location = self.location;
        self.expect_word("structure")?;
        let name = self.parse_name("a structure name")?;
        let extends = if self.eat_word("extends")? {
            Some(self.parse_name("a parent structure name")?)
        } else {
            None
        };
        self.expect(Token::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(&Token::RBrace) {
            fields.push(self.parse_field_decl()?);
        }
        self.expect(Token::RBrace)?;
        Ok(StructureDecl {
            name,
            extends,
            fields,
            location,
        })
    }

    fn parse_field_decl(&mut self) -> Result<FieldDecl> {
        let location = self.location;
        let number = u32::try_from(self.parse_integer("a field number")?)
            .map_err(|_| self.error("field numbers must not be negative"))?;
        self.expect(Token::RParen)?;
        let name = self.parse_name("a field name")?;
        self.expect(Token::Colon)?;
        let ftype = self.parse_field_type()?;

        let mut classifiers = Vec::new();
        while let Token::Identifier(word) = &self.current_token {
            let Some(classifier) = Classifier::from_keyword(word) else {
                break;
            };
            classifiers.push(classifier);
            self.advance()?;
        }
        Ok(FieldDecl {
            number,
            name,
            ftype,
            classifiers,
            location,
        })
    }

    fn parse_field_type(&mut self) -> Result<FieldType> {
        let word = self.parse_name("a field type")?;
        if word.eq_ignore_ascii_case("map") {
            let close = self.open_type_arguments()?;
            let key = self.parse_value_datatype()?;
            self.expect(Token::Comma)?;
            let value = self.parse_value_datatype()?;
            self.expect(close)?;
            return Ok(FieldType::ValueMap(key, value));
        }
        if word.eq_ignore_ascii_case("vector") {
            let close = self.open_type_arguments()?;
            let element = self.parse_name("a vector element type")?;
            self.expect(close)?;
            return Ok(match DataType::parse(&element) {
                Some(dtype) => FieldType::ValueVector(dtype),
                None => FieldType::ReferenceVector(element),
            });
        }
        Ok(match DataType::parse(&word) {
            Some(dtype) => FieldType::Value(dtype),
            None => FieldType::Reference(word),
        })
    }

    /// Consume `(`, `<` or `[` and return the matching close token.
    fn open_type_arguments(&mut self) -> Result<Token> {
        let close = match self.current_token {
            Token::LParen => Token::RParen,
            Token::Lt => Token::Gt,
            Token::LBracket => Token::RBracket,
            _ => return Err(self.unexpected("'(', '<' or '['")),
        };
        self.advance()?;
        Ok(close)
    }

    fn parse_value_datatype(&mut self) -> Result<DataType> {
        let word = self.parse_name("a value type")?;
        DataType::parse(&word).ok_or_else(|| self.error(format!("unknown value type '{word}'")))
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    /// Parse expressions with proper precedence:
    /// 1. OR / ||
    /// 2. AND / &&
    /// 3. NOT / !
    /// 4. comparison, IN, IS NULL, BETWEEN
    /// 5. + -
    /// 6. * / %
    /// 7. unary + -
    /// 8. primary
    pub fn parse_expression(&mut self) -> Result<Expr> {
        self.enter()?;
        let expr = self.parse_or();
        self.leave();
        expr
    }

    /// An expression in boolean position; plain values are wrapped so their
    /// type is checked during validation.
    pub fn parse_predicate(&mut self) -> Result<Expr> {
        Ok(into_predicate(self.parse_expression()?))
    }

    fn parse_or(&mut self) -> Result<Expr> {
        self.chained(|p| {
            let mut left = p.parse_and()?;
            while p.check_word("or") || p.check(&Token::OrOr) {
                p.advance()?;
                p.extend_chain()?;
                let right = p.parse_and()?;
                left = Expr::binary_boolean(BoolOp::Or, into_predicate(left), into_predicate(right));
            }
            Ok(left)
        })
    }

    fn parse_and(&mut self) -> Result<Expr> {
        self.chained(|p| {
            let mut left = p.parse_not()?;
            while p.check_word("and") || p.check(&Token::AndAnd) {
                p.advance()?;
                p.extend_chain()?;
                let right = p.parse_not()?;
                left = Expr::binary_boolean(BoolOp::And, into_predicate(left), into_predicate(right));
            }
            Ok(left)
        })
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.check_word("not") || self.check(&Token::Bang) {
            let location = self.location;
            self.advance()?;
            self.enter()?;
            let operand = self.parse_not();
            self.leave();
            let mut expr = Expr::not(into_predicate(operand?));
            if let Expr::Not(node) = &mut expr {
                node.location = location;
            }
            return Ok(expr);
        }
        self.parse_comparison()
    }

    fn compare_op(&self) -> Option<CompareOp> {
        Some(match self.current_token {
            Token::EqEq | Token::Assign => CompareOp::Eq,
            Token::NotEq => CompareOp::Neq,
            Token::Lt => CompareOp::Lt,
            Token::LtEq => CompareOp::Lte,
            Token::Gt => CompareOp::Gt,
            Token::GtEq => CompareOp::Gte,
            _ => return None,
        })
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;
        let location = left.location();

        if let Some(op) = self.compare_op() {
            self.advance()?;
            let right = self.parse_additive()?;
            return Ok(Expr::Comparison(ValueComparison {
                op,
                left: Box::new(left),
                right: Box::new(right),
                location,
            }));
        }

        if self.eat_word("is")? {
            let op = if self.eat_word("not")? {
                NullTestOp::IsNotNull
            } else {
                NullTestOp::IsNull
            };
            self.expect(Token::Null)?;
            return Ok(Expr::NullTest(NullTest {
                op,
                expr: Box::new(left),
                location,
            }));
        }

        let negated = if self.check_word("not") {
            let next = self.peek(1)?;
            if next.is_word("in") || next.is_word("between") {
                self.advance()?;
                true
            } else {
                false
            }
        } else {
            false
        };

        if self.eat_word("in")? {
            let op = if negated { MembershipOp::NotIn } else { MembershipOp::In };
            if self.eat(Token::LParen)? {
                let mut members = vec![self.parse_additive()?];
                while self.eat(Token::Comma)? {
                    members.push(self.parse_additive()?);
                }
                self.expect(Token::RParen)?;
                return Ok(Expr::ExplicitMembership(ExplicitMembership {
                    op,
                    left: Box::new(left),
                    members,
                    location,
                }));
            }
            let vector = self.parse_primary()?;
            return Ok(Expr::VectorMembership(VectorMembership {
                op,
                left: Box::new(left),
                vector: Box::new(vector),
                location,
            }));
        }

        if self.eat_word("between")? {
            let lower = self.parse_additive()?;
            self.expect_word("and")?;
            let upper = self.parse_additive()?;
            return Ok(Expr::Bounds(BoundsTest {
                op: if negated { BoundsOp::NotBetween } else { BoundsOp::Between },
                expr: Box::new(left),
                lower: Box::new(lower),
                upper: Box::new(upper),
                location,
            }));
        }

        if negated {
            return Err(self.unexpected("'IN' or 'BETWEEN'"));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        self.chained(|p| {
            let mut left = p.parse_multiplicative()?;
            loop {
                let op = match p.current_token {
                    Token::Plus => ValueOp::Plus,
                    Token::Minus => ValueOp::Minus,
                    _ => break,
                };
                p.advance()?;
                p.extend_chain()?;
                let right = p.parse_multiplicative()?;
                left = binary_value(op, left, right);
            }
            Ok(left)
        })
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        self.chained(|p| {
            let mut left = p.parse_unary()?;
            loop {
                let op = match p.current_token {
                    Token::Star => ValueOp::Multiply,
                    Token::Slash => ValueOp::Divide,
                    Token::Percent => ValueOp::Modulo,
                    _ => break,
                };
                p.advance()?;
                p.extend_chain()?;
                let right = p.parse_unary()?;
                left = binary_value(op, left, right);
            }
            Ok(left)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let location = self.location;
        let op = match self.current_token {
            Token::Minus => UnaryValueOp::Negate,
            Token::Plus => UnaryValueOp::Normal,
            _ => return self.parse_primary(),
        };
        self.advance()?;

        // negative literals are constants
        if op == UnaryValueOp::Negate {
            match self.current_token {
                Token::Integer(n) => {
                    self.advance()?;
                    return Ok(Expr::constant(Constant::integer(-n), location));
                }
                Token::Float(f) => {
                    self.advance()?;
                    return Ok(Expr::constant(Constant::Double(-f), location));
                }
                _ => {}
            }
        }

        self.enter()?;
        let operand = self.parse_unary();
        self.leave();
        Ok(Expr::UnaryValue(UnaryValue {
            op,
            expr: Box::new(operand?),
            location,
        }))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let location = self.location;
        match mem::replace(&mut self.current_token, Token::Eof) {
            // Literals
            Token::Integer(n) => {
                self.advance()?;
                Ok(Expr::constant(Constant::integer(n), location))
            }
            Token::Float(f) => {
                self.advance()?;
                Ok(Expr::constant(Constant::Double(f), location))
            }
            Token::String(s) => {
                self.advance()?;
                Ok(Expr::constant(Constant::String(s), location))
            }
            Token::Boolean(b) => {
                self.advance()?;
                Ok(Expr::boolean(b, location))
            }
            Token::Null => {
                self.advance()?;
                Ok(Expr::constant(Constant::Null, location))
            }

            Token::Parameter(name) => {
                self.advance()?;
                Ok(Expr::Parameter(ParameterAccessor {
                    name,
                    definition: None,
                    eval_point: None,
                    location,
                }))
            }

            Token::LParen => {
                self.advance()?;
                let saved = self.target_depth.take();
                let expr = self.parse_expression();
                self.target_depth = saved;
                let expr = expr?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }

            Token::Identifier(word) => {
                self.current_token = Token::Identifier(word.clone());
                self.parse_word(word, location)
            }

            token => {
                self.current_token = token;
                Err(self.unexpected("an expression"))
            }
        }
    }

    /// A primary starting with a bare word: keyword constructs, calls, or a
    /// path.
    fn parse_word(&mut self, word: String, location: Location) -> Result<Expr> {
        let lower = word.to_ascii_lowercase();
        let next = self.peek(1)?.clone();

        if lower == "now" && !matches!(next, Token::LParen | Token::Dot) {
            self.advance()?;
            return Ok(Expr::Now(Now { location }));
        }

        if (lower == "start" || lower == "end") && next.is_word("of") {
            self.advance()?;
            self.advance()?;
            let target = self.parse_path()?;
            return Ok(Expr::Boundary(BoundaryBoolean {
                op: if lower == "start" { BoundaryOp::Start } else { BoundaryOp::End },
                target,
                location,
            }));
        }

        if lower == "top" && next == Token::LBracket {
            self.advance()?;
            self.advance()?;
            let size = u32::try_from(self.parse_integer("a top size")?)
                .map_err(|_| self.error("top size must be a positive integer"))?;
            self.expect(Token::RBracket)?;
            return self.parse_aggregation(AggregationOp::Top, Some(size), location);
        }

        if next == Token::LParen {
            if lower == "cast" {
                self.advance()?;
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect_word("as")?;
                let dtype = self.parse_value_datatype()?;
                self.expect(Token::RParen)?;
                return Ok(Expr::Cast(Cast {
                    expr: Box::new(expr),
                    dtype,
                    location,
                }));
            }
            if let Some(op) = ConversionOp::from_keyword(&lower) {
                self.advance()?;
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                return Ok(Expr::Conversion(DateTimeConversion {
                    op,
                    expr: Box::new(expr),
                    location,
                }));
            }
            if let Some(op) = TimeOp::from_keyword(&lower) {
                self.advance()?;
                self.advance()?;
                let expr = self.parse_expression()?;
                let timezone = if self.eat(Token::Comma)? {
                    Some(self.parse_timezone()?)
                } else {
                    None
                };
                self.expect(Token::RParen)?;
                return Ok(Expr::Quantum(DateTimeQuantum {
                    op,
                    expr: Box::new(expr),
                    timezone,
                    location,
                }));
            }
            if let Some(op) = AggregationOp::from_keyword(&lower) {
                self.advance()?;
                return self.parse_aggregation(op, None, location);
            }

            self.advance()?;
            self.advance()?;
            let mut args = Vec::new();
            if !self.check(&Token::RParen) {
                args.push(self.parse_expression()?);
                while self.eat(Token::Comma)? {
                    args.push(self.parse_expression()?);
                }
            }
            self.expect(Token::RParen)?;
            return Ok(Expr::Function(FunctionCall {
                name: word,
                function: None,
                args,
                location,
            }));
        }

        Ok(Expr::Path(self.parse_path()?))
    }

    /// `'Europe/Paris'` or an hour offset such as `-8`.
    fn parse_timezone(&mut self) -> Result<String> {
        if let Token::String(tz) = &self.current_token {
            let tz = tz.clone();
            self.advance()?;
            return Ok(tz);
        }
        let hours = self.parse_integer("a timezone")?;
        i32::try_from(hours * 3600)
            .ok()
            .and_then(FixedOffset::east_opt)
            .map(|offset| offset.to_string())
            .ok_or_else(|| self.error(format!("invalid timezone offset '{hours}'")))
    }

    /// `OP(expr) [SCOPE path] [ROLLING n] [WHERE predicate]`, positioned at
    /// the opening parenthesis.
    fn parse_aggregation(&mut self, op: AggregationOp, size: Option<u32>, location: Location) -> Result<Expr> {
        self.expect(Token::LParen)?;
        let saved = self.target_depth.take();
        let expr = self.parse_expression();
        self.target_depth = saved;
        let expr = expr?;
        self.expect(Token::RParen)?;

        let mut scope = None;
        let mut quanta = None;
        let mut filter = None;
        loop {
            if scope.is_none() && self.eat_word("scope")? {
                scope = Some(Box::new(Expr::Path(self.parse_path()?)));
            } else if quanta.is_none() && self.eat_word("rolling")? {
                quanta = Some(Box::new(self.parse_primary()?));
            } else if filter.is_none() && self.check_word("where") && self.target_depth != Some(self.depth) {
                self.advance()?;
                filter = Some(Box::new(into_predicate(self.parse_comparison()?)));
            } else {
                break;
            }
        }

        Ok(Expr::Aggregation(Aggregation {
            op,
            size,
            expr: Box::new(expr),
            scope,
            quanta,
            filter,
            location,
        }))
    }

    fn parse_path(&mut self) -> Result<PathAccessor> {
        let location = self.location;
        let mut components = vec![self.parse_name("a path")?];
        while self.eat(Token::Dot)? {
            match mem::replace(&mut self.current_token, Token::Eof) {
                Token::Identifier(name) => {
                    components.push(name);
                    self.advance()?;
                }
                token => {
                    self.current_token = token;
                    return Err(self.unexpected("a path component"));
                }
            }
        }
        let mut accessor = PathAccessor::new(components, location);
        if self.eat(Token::LBracket)? {
            let key = self.parse_expression()?;
            self.expect(Token::RBracket)?;
            accessor.key = Some(Box::new(key));
        }
        Ok(accessor)
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    /// `VIEW name { rule* }`
    pub fn parse_view(&mut self) -> Result<View> {
        let location = self.location;
        self.expect_word("view")?;
        let name = self.parse_name("a view name")?;
        self.expect(Token::LBrace)?;
        let mut rules = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.eat(Token::Semicolon)? {
                continue;
            }
            rules.push(self.parse_rule()?);
        }
        self.expect(Token::RBrace)?;
        View::new(name, rules, location)
    }

    fn parse_rule(&mut self) -> Result<FilterRule> {
        let location = self.location;
        let action = if self.eat_word("include")? {
            Some(EditAction::Include)
        } else if self.eat_word("exclude")? {
            Some(EditAction::Exclude)
        } else {
            None
        };
        if let Some(action) = action {
            let target = self.parse_path()?;
            let predicate = self.parse_rule_where(location)?;
            return Ok(FilterRule::Edit(EditRule {
                action,
                target,
                predicate,
                location,
            }));
        }

        let presample = if self.eat_word("presample")? || self.eat_word("sample")? {
            true
        } else if self.eat_word("postsample")? {
            false
        } else {
            return Err(self.unexpected("'INCLUDE', 'EXCLUDE', 'PRESAMPLE' or 'POSTSAMPLE'"));
        };
        self.expect(Token::LParen)?;
        let amount = self.parse_expression()?;
        self.expect(Token::RParen)?;
        let target = match self.current_token {
            Token::Identifier(_) if !self.check_word("where") && !self.is_rule_start() => Some(self.parse_path()?),
            _ => None,
        };
        let predicate = self.parse_rule_where(location)?;
        let rule = SampleRule {
            amount,
            target,
            predicate,
            location,
        };
        Ok(if presample {
            FilterRule::Presample(rule)
        } else {
            FilterRule::Postsample(rule)
        })
    }

    fn is_rule_start(&self) -> bool {
        ["include", "exclude", "presample", "sample", "postsample"]
            .iter()
            .any(|w| self.check_word(w))
    }

    fn parse_rule_where(&mut self, location: Location) -> Result<Expr> {
        if self.eat_word("where")? {
            self.parse_predicate()
        } else {
            Ok(Expr::boolean(true, location))
        }
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    pub fn parse_statements(&mut self) -> Result<Statements> {
        let location = self.location;
        let mut statements = Vec::new();
        loop {
            while self.eat(Token::Semicolon)? {}
            if self.check(&Token::Eof) {
                break;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Statements { statements, location })
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        if self.check_word("select") {
            Ok(Statement::Query(self.parse_query()?))
        } else if self.check_word("funnel") {
            Ok(Statement::Funnel(self.parse_funnel()?))
        } else if self.check_word("segment") {
            Ok(Statement::Segment(self.parse_segment()?))
        } else {
            Err(self.unexpected("'SELECT', 'FUNNEL' or 'SEGMENT'"))
        }
    }

    /// `SELECT [(params)] body (BESIDE SELECT body)* FROM sources [WHERE p] [LIMIT n]`
    pub fn parse_query(&mut self) -> Result<Query> {
        let location = self.location;
        self.expect_word("select")?;
        let parameters = self.parse_optional_parameters()?;
        let mut selects = vec![self.parse_select_body(1, location)?];

        while self.eat_word("beside")? {
            selects.push(self.parse_beside_select(selects.len() + 1)?);
        }

        self.expect_word("from")?;
        let sources = self.parse_sources()?;
        let filter = if self.eat_word("where")? {
            Some(self.parse_predicate()?)
        } else {
            None
        };
        let limit = self.parse_limit()?;

        while self.eat_word("beside")? {
            selects.push(self.parse_beside_select(selects.len() + 1)?);
        }

        Ok(Query {
            parameters,
            selects,
            sources,
            filter,
            limit,
            location,
        })
    }

    fn parse_beside_select(&mut self, index: usize) -> Result<Select> {
        let location = self.location;
        self.expect_word("select")?;
        if !self.parse_optional_parameters()?.is_empty() {
            return Err(MotifError::parse(location, "only the first select may have parameters"));
        }
        self.parse_select_body(index, location)
    }

    fn parse_select_body(&mut self, index: usize, location: Location) -> Result<Select> {
        let mut targets = vec![self.parse_target(1)?];
        while self.eat(Token::Comma)? {
            targets.push(self.parse_target(targets.len() + 1)?);
        }
        let filter = if self.eat_word("where")? {
            Some(self.parse_predicate()?)
        } else {
            None
        };
        let limit = self.parse_limit()?;
        Ok(Select {
            name: format!("query_{index}"),
            targets,
            filter,
            limit,
            scope: None,
            location,
        })
    }

    /// `expr [AS name]` or `name = expr`
    fn parse_target(&mut self, index: usize) -> Result<Target> {
        let location = self.location;
        let assigned = matches!(self.current_token, Token::Identifier(_) | Token::String(_))
            && *self.peek(1)? == Token::Assign;
        if assigned {
            let name = self.parse_name("a target name")?;
            self.expect(Token::Assign)?;
            let expr = self.parse_target_expression()?;
            return Ok(Target { name, expr, location });
        }

        let expr = self.parse_target_expression()?;
        let name = if self.eat_word("as")? {
            self.parse_name("a target name")?
        } else {
            format!("target_{index}")
        };
        Ok(Target { name, expr, location })
    }

    fn parse_target_expression(&mut self) -> Result<Expr> {
        let saved = self.target_depth.replace(self.depth + 1);
        let expr = self.parse_expression();
        self.target_depth = saved;
        expr
    }

    fn parse_limit(&mut self) -> Result<Option<i64>> {
        if self.eat_word("limit")? {
            Ok(Some(self.parse_integer("a limit")?))
        } else {
            Ok(None)
        }
    }

    /// `(name: type, name: vector[type])` after a statement keyword or name.
    fn parse_optional_parameters(&mut self) -> Result<Vec<ParameterDefinition>> {
        if !self.check(&Token::LParen) {
            return Ok(Vec::new());
        }
        let declares = matches!(self.peek(1)?, Token::Identifier(_) | Token::String(_))
            && *self.peek(2)? == Token::Colon;
        if !declares {
            return Ok(Vec::new());
        }

        self.advance()?;
        let mut parameters = vec![self.parse_parameter()?];
        while self.eat(Token::Comma)? {
            parameters.push(self.parse_parameter()?);
        }
        self.expect(Token::RParen)?;
        Ok(parameters)
    }

    fn parse_parameter(&mut self) -> Result<ParameterDefinition> {
        let location = self.location;
        let name = self.parse_name("a parameter name")?;
        self.expect(Token::Colon)?;
        let type_name = self.parse_name("a parameter type")?;
        let (vector, dtype_name) = if type_name.eq_ignore_ascii_case("vector") {
            let close = self.open_type_arguments()?;
            let element = self.parse_name("a vector element type")?;
            self.expect(close)?;
            (true, element)
        } else {
            (false, type_name)
        };
        let dtype = DataType::parse(&dtype_name)
            .filter(|dt| *dt != DataType::Null)
            .ok_or_else(|| {
                let kind = if vector { "vector" } else { "scalar" };
                MotifError::parse(location, format!("only the simple data types are supported for {kind} parameters"))
            })?;
        Ok(ParameterDefinition {
            name,
            dtype,
            vector,
            location,
        })
    }

    fn parse_sources(&mut self) -> Result<Vec<Source>> {
        let mut sources = vec![self.parse_source()?];
        while self.eat(Token::Comma)? {
            sources.push(self.parse_source()?);
        }
        Ok(sources)
    }

    fn parse_source(&mut self) -> Result<Source> {
        let location = self.location;
        if self.eat_word("schema")? {
            let name = self.parse_name("a schema name")?;
            let alias = self.parse_alias()?;
            return Ok(Source::Schema(SchemaSource { name, alias, location }));
        }

        let funnel = if self.eat_word("funnel")? {
            true
        } else if self.eat_word("segment")? {
            false
        } else {
            return Err(self.unexpected("'SCHEMA', 'FUNNEL' or 'SEGMENT'"));
        };
        let name = self.parse_name("a source name")?;
        let mut args = Vec::new();
        if self.eat(Token::LParen)? {
            if !self.check(&Token::RParen) {
                args.push(self.parse_additive()?);
                while self.eat(Token::Comma)? {
                    args.push(self.parse_additive()?);
                }
            }
            self.expect(Token::RParen)?;
        }
        let alias = self.parse_alias()?;
        let source = StatementSource {
            name,
            alias,
            args,
            location,
        };
        Ok(if funnel { Source::Funnel(source) } else { Source::Segment(source) })
    }

    fn parse_alias(&mut self) -> Result<Option<String>> {
        if self.eat_word("as")? {
            Ok(Some(self.parse_name("an alias")?))
        } else {
            Ok(None)
        }
    }

    /// `SEGMENT name [(params)] { (SEGMENT id WHEN predicate)* } FROM sources`
    fn parse_segment(&mut self) -> Result<Segment> {
        let location = self.location;
        self.expect_word("segment")?;
        let name = self.parse_name("a segment name")?;
        let parameters = self.parse_optional_parameters()?;
        self.expect(Token::LBrace)?;
        let mut definitions = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.eat(Token::Semicolon)? {
                continue;
            }
            let def_location = self.location;
            self.expect_word("segment")?;
            let id = match mem::replace(&mut self.current_token, Token::Eof) {
                Token::Integer(n) => n.to_string(),
                Token::Identifier(s) | Token::String(s) => s,
                token => {
                    self.current_token = token;
                    return Err(self.unexpected("a segment identifier"));
                }
            };
            self.advance()?;
            self.expect_word("when")?;
            let predicate = self.parse_predicate()?;
            definitions.push(SegmentDefinition {
                id,
                predicate,
                location: def_location,
            });
        }
        self.expect(Token::RBrace)?;
        self.expect_word("from")?;
        let sources = self.parse_sources()?;
        Ok(Segment {
            name,
            parameters,
            sources,
            definitions,
            location,
        })
    }

    /// `FUNNEL name [(params)] [CONVERSION|TRANSACTION] [WITHIN v] [LIMIT n] { step* match } FROM sources`
    fn parse_funnel(&mut self) -> Result<Funnel> {
        let location = self.location;
        self.expect_word("funnel")?;
        let name = self.parse_name("a funnel name")?;
        let parameters = self.parse_optional_parameters()?;
        let funnel_type = if self.eat_word("transaction")? {
            FunnelType::Transaction
        } else {
            self.eat_word("conversion")?;
            FunnelType::Conversion
        };

        let mut within = None;
        let mut limit = None;
        loop {
            if within.is_none() && self.eat_word("within")? {
                within = Some(self.parse_additive()?);
            } else if limit.is_none() && self.check_word("limit") {
                limit = self.parse_limit()?;
            } else {
                break;
            }
        }

        self.expect(Token::LBrace)?;
        let mut steps = Vec::new();
        while self.check_word("step") {
            steps.push(self.parse_step()?);
        }
        if self.check(&Token::RBrace) {
            return Err(self.error("funnel must have a match definition"));
        }
        let definition = self.parse_match_or()?;
        self.expect(Token::RBrace)?;
        self.expect_word("from")?;
        let sources = self.parse_sources()?;

        Ok(Funnel {
            name,
            funnel_type,
            parameters,
            sources,
            steps,
            definition,
            within,
            limit,
            location,
        })
    }

    /// `STEP id WHEN predicate [TIMING ON v] [AFTER v] [WITHIN v]`
    fn parse_step(&mut self) -> Result<StepDefinition> {
        let location = self.location;
        self.expect_word("step")?;
        let id = self.parse_integer("a step id")?;
        self.expect_word("when")?;
        let when = self.parse_predicate()?;

        let mut timing = None;
        let mut after = None;
        let mut within = None;
        loop {
            if timing.is_none() && self.eat_word("timing")? {
                self.expect_word("on")?;
                timing = Some(self.parse_additive()?);
            } else if after.is_none() && self.eat_word("after")? {
                after = Some(self.parse_additive()?);
            } else if within.is_none() && self.eat_word("within")? {
                within = Some(self.parse_additive()?);
            } else {
                break;
            }
        }
        Ok(StepDefinition {
            id,
            when,
            timing,
            after,
            within,
            location,
        })
    }

    fn parse_match_or(&mut self) -> Result<MatchDefinition> {
        let location = self.location;
        let mut items = vec![self.parse_match_and()?];
        while self.eat(Token::Pipe)? {
            items.push(self.parse_match_and()?);
        }
        Ok(match_list(MatchOp::Or, items, location))
    }

    fn parse_match_and(&mut self) -> Result<MatchDefinition> {
        let location = self.location;
        let mut items = vec![self.parse_match_repeat()?];
        while self.eat(Token::Colon)? {
            items.push(self.parse_match_repeat()?);
        }
        Ok(match_list(MatchOp::And, items, location))
    }

    fn parse_match_repeat(&mut self) -> Result<MatchDefinition> {
        let location = self.location;
        let mut definition = self.parse_match_atom()?;
        loop {
            let (min, max) = match self.current_token {
                Token::Star => (0, None),
                Token::Plus => (1, None),
                Token::Question => (0, Some(1)),
                Token::LBracket => {
                    self.advance()?;
                    let min = if self.eat(Token::Star)? { 0 } else { self.parse_integer("a repeat minimum")? };
                    self.expect(Token::Colon)?;
                    let max = if self.eat(Token::Star)? { None } else { Some(self.parse_integer("a repeat maximum")?) };
                    if !self.check(&Token::RBracket) {
                        return Err(self.unexpected("']'"));
                    }
                    (min, max)
                }
                _ => break,
            };
            self.advance()?;
            definition = MatchDefinition::Repeat(MatchRepeat {
                min,
                max,
                definition: Box::new(definition),
                capture: true,
                location,
            });
        }
        Ok(definition)
    }

    fn parse_match_atom(&mut self) -> Result<MatchDefinition> {
        let location = self.location;
        match self.current_token {
            Token::Integer(id) => {
                self.advance()?;
                Ok(MatchDefinition::Step(MatchStep {
                    id,
                    capture: true,
                    location,
                }))
            }
            Token::LParen | Token::LBrace => {
                let capture = self.check(&Token::LParen);
                self.advance()?;
                self.enter()?;
                let inner = self.parse_match_or();
                self.leave();
                let mut inner = inner?;
                self.expect(if capture { Token::RParen } else { Token::RBrace })?;
                if !capture {
                    inner.set_non_capture();
                }
                Ok(inner)
            }
            Token::LBracket => {
                self.advance()?;
                let negated = self.eat(Token::Caret)?;
                let mut steps = Vec::new();
                while let Token::Integer(id) = self.current_token {
                    steps.push(MatchStep {
                        id,
                        capture: true,
                        location: self.location,
                    });
                    self.advance()?;
                    self.eat(Token::Comma)?;
                }
                if steps.is_empty() {
                    return Err(self.unexpected("a step id"));
                }
                self.expect(Token::RBracket)?;
                Ok(MatchDefinition::Bracket(MatchBracket {
                    negated,
                    steps,
                    capture: true,
                    location,
                }))
            }
            _ => Err(self.unexpected("a step id, '(', '{' or '['")),
        }
    }
}

fn match_list(op: MatchOp, mut items: Vec<MatchDefinition>, location: Location) -> MatchDefinition {
    if items.len() == 1 {
        return items.remove(0);
    }
    MatchDefinition::List(MatchList {
        op,
        items,
        capture: true,
        location,
    })
}

fn binary_value(op: ValueOp, left: Expr, right: Expr) -> Expr {
    let location = left.location();
    Expr::BinaryValue(BinaryValue {
        op,
        left: Box::new(left),
        right: Box::new(right),
        location,
    })
}

/// Wrap a value expression standing in boolean position.
pub fn into_predicate(expr: Expr) -> Expr {
    if expr.is_predicate() {
        return expr;
    }
    let location = expr.location();
    Expr::BooleanValue(BooleanValue {
        expr: Box::new(expr),
        location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(text: &str) -> Expr {
        let mut parser = Parser::new(text).unwrap();
        let expr = parser.parse_expression().unwrap();
        parser.finish().unwrap();
        expr
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let e = expr("a.b == 1 or a.c == 2 and a.d == 3");
        let Expr::BinaryBoolean(or) = e else { panic!("expected OR") };
        assert_eq!(or.op, BoolOp::Or);
        assert!(matches!(*or.right, Expr::BinaryBoolean(ref and) if and.op == BoolOp::And));
    }

    #[test]
    fn between_consumes_its_and() {
        let e = expr("x.y between 1 and 5 and x.z == 2");
        let Expr::BinaryBoolean(and) = e else { panic!("expected AND") };
        assert!(matches!(*and.left, Expr::Bounds(_)));
    }

    #[test]
    fn negative_literals_fold() {
        assert_eq!(expr("-5").as_constant(), Some(&Constant::Byte(-5)));
        assert!(matches!(expr("-x.y"), Expr::UnaryValue(_)));
    }

    #[test]
    fn keyword_calls_parse() {
        assert!(matches!(expr("NOW - DAYS(30)"), Expr::BinaryValue(_)));
        assert!(matches!(expr("cast(x.y as long)"), Expr::Cast(_)));
        assert!(matches!(expr("top[5](x.y)"), Expr::Aggregation(Aggregation { size: Some(5), .. })));
        assert!(matches!(expr("size(x.y)"), Expr::Function(_)));
        assert!(matches!(expr("start of x.y"), Expr::Boundary(_)));
        let Expr::Quantum(q) = expr("day(x.y, -8)") else { panic!("expected quantum") };
        assert_eq!(q.timezone.as_deref(), Some("-08:00"));
    }

    #[test]
    fn map_keys_attach_to_paths() {
        let Expr::Path(p) = expr("user.sessions.parameters['campaign']") else { panic!("expected path") };
        assert_eq!(p.full_path(), "user.sessions.parameters");
        assert!(p.key.is_some());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let text = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        let mut parser = Parser::new(&text).unwrap().with_max_depth(20);
        let err = parser.parse_expression().unwrap_err();
        assert_eq!(err.message(), "expression too deep");
    }

    #[test]
    fn long_operator_chains_are_rejected() {
        for op in [" or ", " and ", " + ", " * "] {
            let text = vec!["x.y"; 50].join(op);
            let mut parser = Parser::new(&text).unwrap().with_max_depth(20);
            let err = parser.parse_expression().unwrap_err();
            assert_eq!(err.message(), "expression too deep", "{}", op);
        }
    }

    #[test]
    fn sibling_chains_do_not_accumulate() {
        let chain = vec!["x.y"; 10].join(" + ");
        let text = vec![format!("({chain}) > 0"); 10].join(" or ");
        let mut parser = Parser::new(&text).unwrap().with_max_depth(40);
        assert!(parser.parse_expression().is_ok());
    }

    #[test]
    fn select_where_is_not_an_aggregation_filter() {
        let mut parser = Parser::new("select count(user) where user.id > 1 from schema quo").unwrap();
        let query = parser.parse_query().unwrap();
        assert!(query.selects[0].filter.is_some());
        assert!(matches!(&query.selects[0].targets[0].expr, Expr::Aggregation(a) if a.filter.is_none()));
        assert_eq!(query.selects[0].targets[0].name, "target_1");
    }

    #[test]
    fn match_definitions_nest() {
        let mut parser = Parser::new("1 : (2 | 3)* : {4} : [^5 6] : 7[2:*]").unwrap();
        let def = parser.parse_match_or().unwrap();
        let MatchDefinition::List(list) = def else { panic!("expected list") };
        assert_eq!(list.op, MatchOp::And);
        assert_eq!(list.items.len(), 5);
        assert!(matches!(list.items[1], MatchDefinition::Repeat(MatchRepeat { min: 0, max: None, .. })));
        assert!(!list.items[2].capture());
        assert!(matches!(list.items[3], MatchDefinition::Bracket(MatchBracket { negated: true, .. })));
        assert!(matches!(list.items[4], MatchDefinition::Repeat(MatchRepeat { min: 2, max: None, .. })));
    }

    #[test]
    fn schema_text_builds() {
        let schema = parse_schema(
            "schema Mini { version : 2 root) thing : Thing
               structure Thing { 0) id : long key 1) tags : map<string, long> 2) parts : vector(Part) }
               structure Part { 0) at : long ordinal } }",
        )
        .unwrap();
        assert_eq!(schema.version, 2);
        assert_eq!(schema.structure_paths(), vec!["thing".to_string(), "thing.parts".to_string()]);
    }
}
