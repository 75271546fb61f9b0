//! IDL parser
//!
//! Recursive descent over the token stream for the subset of MIDL that COM
//! type libraries are written in.

use crate::ast::*;
use crate::error::{Result, Span, TypeLibError};
use crate::lexer::{Lexer, SpannedToken, Token};

pub fn parse(input: &str) -> Result<File> {
    let tokens = Lexer::new(input).tokenize()?;
    Parser::new(&tokens).parse_file()
}

struct Parser<'a> {
    tokens: &'a [SpannedToken],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [SpannedToken]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).map(|t| &t.token).unwrap_or(&Token::Eof)
    }

    fn span(&self) -> Span {
        self.tokens.get(self.pos).or(self.tokens.last()).map(|t| t.span).unwrap_or_default()
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.current() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, expected: &str) -> TypeLibError {
        TypeLibError::parse(self.span(), format!("expected {expected}, found {:?}", self.current()))
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("{token:?}")))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.current() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("identifier")),
        }
    }

    fn expect_str(&mut self) -> Result<String> {
        match self.current() {
            Token::Str(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.error("string literal")),
        }
    }

    fn expect_integer(&mut self) -> Result<i64> {
        let negative = self.eat(&Token::Minus);
        match self.current() {
            Token::Integer(n) => {
                let n = *n;
                self.advance();
                Ok(if negative { -n } else { n })
            }
            _ => Err(self.error("integer")),
        }
    }

    fn parse_file(&mut self) -> Result<File> {
        let mut items = Vec::new();
        while *self.current() != Token::Eof {
            if let Some(item) = self.parse_item()? {
                items.push(item);
            }
        }
        Ok(File { items })
    }

    /// One top-level or library-level item. Stray semicolons yield `None`.
    fn parse_item(&mut self) -> Result<Option<Item>> {
        if self.eat(&Token::Semicolon) {
            return Ok(None);
        }

        let attrs = self.parse_optional_attributes()?;
        let item = match self.current() {
            Token::Import => self.parse_import()?,
            Token::ImportLib => {
                self.advance();
                self.expect(&Token::LParen)?;
                let lib = self.expect_str()?;
                self.expect(&Token::RParen)?;
                self.eat(&Token::Semicolon);
                Item::ImportLib(lib)
            }
            Token::CppQuote => {
                self.advance();
                self.expect(&Token::LParen)?;
                let text = self.expect_str()?;
                self.expect(&Token::RParen)?;
                self.eat(&Token::Semicolon);
                Item::CppQuote(text)
            }
            Token::Typedef => self.parse_typedef(attrs)?,
            Token::Struct => {
                let decl = self.parse_struct_body(attrs, None)?;
                self.expect(&Token::Semicolon)?;
                Item::Struct(decl)
            }
            Token::Enum => {
                let decl = self.parse_enum_body(attrs, None)?;
                self.expect(&Token::Semicolon)?;
                Item::Enum(decl)
            }
            Token::Interface => self.parse_interface(attrs)?,
            Token::Coclass => self.parse_coclass(attrs)?,
            Token::Library => self.parse_library(attrs)?,
            _ => return Err(self.error("declaration")),
        };
        Ok(Some(item))
    }

    fn parse_optional_attributes(&mut self) -> Result<Vec<Attribute>> {
        if *self.current() == Token::LBracket {
            self.parse_attributes()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_attributes(&mut self) -> Result<Vec<Attribute>> {
        self.expect(&Token::LBracket)?;
        let mut attrs = Vec::new();
        if *self.current() != Token::RBracket {
            loop {
                attrs.push(self.parse_attribute()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(attrs)
    }

    fn parse_attribute(&mut self) -> Result<Attribute> {
        let span = self.span();
        let name = self.expect_ident()?;

        let attr = match name.as_str() {
            "uuid" => {
                self.expect(&Token::LParen)?;
                let uuid = match self.current() {
                    Token::Uuid(u) | Token::Str(u) => u.clone(),
                    _ => return Err(self.error("UUID")),
                };
                self.advance();
                self.expect(&Token::RParen)?;
                Attribute::Uuid(uuid)
            }
            "version" => {
                self.expect(&Token::LParen)?;
                let version = match self.current().clone() {
                    Token::Decimal(text) => {
                        self.advance();
                        parse_version(&text).ok_or_else(|| TypeLibError::parse(span, format!("bad version {text}")))?
                    }
                    Token::Integer(major) => {
                        self.advance();
                        let major = u16::try_from(major).map_err(|_| TypeLibError::parse(span, "version out of range"))?;
                        (major, 0)
                    }
                    _ => return Err(self.error("version")),
                };
                self.expect(&Token::RParen)?;
                Attribute::Version(version.0, version.1)
            }
            "helpstring" => Attribute::HelpString(self.parse_str_argument()?),
            "progid" => Attribute::ProgId(self.parse_str_argument()?),
            "threading" => {
                self.expect(&Token::LParen)?;
                let model = match self.current() {
                    Token::Ident(s) | Token::Str(s) => s.clone(),
                    _ => return Err(self.error("threading model")),
                };
                self.advance();
                self.expect(&Token::RParen)?;
                Attribute::Threading(model)
            }
            "pointer_default" => {
                self.expect(&Token::LParen)?;
                let kind = match self.expect_ident()?.as_str() {
                    "ref" => PointerKind::Ref,
                    "unique" => PointerKind::Unique,
                    "ptr" => PointerKind::Ptr,
                    other => return Err(TypeLibError::parse(span, format!("unknown pointer kind {other}"))),
                };
                self.expect(&Token::RParen)?;
                Attribute::PointerDefault(kind)
            }
            "object" => Attribute::Object,
            "local" => Attribute::Local,
            "in" => Attribute::In,
            "out" => Attribute::Out,
            "retval" => Attribute::Retval,
            "string" => Attribute::String,
            "default" => Attribute::Default,
            "source" => Attribute::Source,
            "oleautomation" => Attribute::OleAutomation,
            "dual" => Attribute::Dual,
            _ => {
                let argument = if *self.current() == Token::LParen {
                    Some(self.skip_balanced_parens()?)
                } else {
                    None
                };
                Attribute::Unknown(name, argument)
            }
        };
        Ok(attr)
    }

    fn parse_str_argument(&mut self) -> Result<String> {
        self.expect(&Token::LParen)?;
        let s = self.expect_str()?;
        self.expect(&Token::RParen)?;
        Ok(s)
    }

    /// Consume `( ... )` and return the tokens inside, roughly as written.
    fn skip_balanced_parens(&mut self) -> Result<String> {
        self.expect(&Token::LParen)?;
        let mut depth = 1;
        let mut text = Vec::new();
        loop {
            match self.current() {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return Ok(text.join(" "));
                    }
                }
                Token::Eof => return Err(self.error("')'")),
                _ => {}
            }
            text.push(token_text(self.current()));
            self.advance();
        }
    }

    fn parse_import(&mut self) -> Result<Item> {
        self.expect(&Token::Import)?;
        let mut files = vec![self.expect_str()?];
        while self.eat(&Token::Comma) {
            files.push(self.expect_str()?);
        }
        self.expect(&Token::Semicolon)?;
        Ok(Item::Import(files))
    }

    fn parse_typedef(&mut self, mut attrs: Vec<Attribute>) -> Result<Item> {
        let span = self.span();
        self.expect(&Token::Typedef)?;
        attrs.extend(self.parse_optional_attributes()?);

        let item = match self.current() {
            Token::Struct if self.struct_body_follows() => {
                let mut decl = self.parse_struct_body(attrs, None)?;
                let name = self.parse_typedef_names()?;
                decl.tag = Some(std::mem::replace(&mut decl.name, name)).filter(|tag| !tag.is_empty());
                Item::Struct(decl)
            }
            Token::Enum if self.struct_body_follows() => {
                let mut decl = self.parse_enum_body(attrs, None)?;
                let name = self.parse_typedef_names()?;
                decl.tag = Some(std::mem::replace(&mut decl.name, name)).filter(|tag| !tag.is_empty());
                Item::Enum(decl)
            }
            _ => {
                let ty = self.parse_type()?;
                let name = self.parse_typedef_names()?;
                Item::Alias(AliasDecl { attrs, ty, name, span })
            }
        };
        Ok(item)
    }

    /// Whether the tokens after `struct`/`enum` open a body (`{` or `Tag {`).
    fn struct_body_follows(&self) -> bool {
        let next = |n: usize| self.tokens.get(self.pos + n).map(|t| &t.token);
        matches!(next(1), Some(Token::LBrace))
            || (matches!(next(1), Some(Token::Ident(_))) && matches!(next(2), Some(Token::LBrace)))
    }

    /// `Name, *PName;` keeping the first, non-pointer name.
    fn parse_typedef_names(&mut self) -> Result<String> {
        let name = self.expect_ident()?;
        while self.eat(&Token::Comma) {
            while self.eat(&Token::Star) {}
            self.expect_ident()?;
        }
        self.expect(&Token::Semicolon)?;
        Ok(name)
    }

    /// `struct Tag? { fields }`. The tag becomes the name; typedefs rename it.
    fn parse_struct_body(&mut self, attrs: Vec<Attribute>, name: Option<String>) -> Result<StructDecl> {
        let span = self.span();
        self.expect(&Token::Struct)?;
        let tag = match self.current() {
            Token::Ident(_) => Some(self.expect_ident()?),
            _ => None,
        };
        self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        while !self.eat(&Token::RBrace) {
            fields.push(self.parse_field()?);
        }
        Ok(StructDecl {
            attrs,
            tag: None,
            name: name.or(tag).unwrap_or_default(),
            fields,
            span,
        })
    }

    fn parse_field(&mut self) -> Result<FieldDecl> {
        let attrs = self.parse_optional_attributes()?;
        let span = self.span();
        let ty = self.parse_type()?;
        let name = self.expect_ident()?;
        if *self.current() == Token::LBracket {
            return Err(TypeLibError::parse(self.span(), format!("array field {name} is not supported")));
        }
        self.expect(&Token::Semicolon)?;
        Ok(FieldDecl { attrs, ty, name, span })
    }

    fn parse_enum_body(&mut self, attrs: Vec<Attribute>, name: Option<String>) -> Result<EnumDecl> {
        let span = self.span();
        self.expect(&Token::Enum)?;
        let tag = match self.current() {
            Token::Ident(_) => Some(self.expect_ident()?),
            _ => None,
        };
        self.expect(&Token::LBrace)?;
        let mut variants = Vec::new();
        while *self.current() != Token::RBrace {
            let variant = self.expect_ident()?;
            let value = if self.eat(&Token::Equals) { Some(self.expect_integer()?) } else { None };
            variants.push((variant, value));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(EnumDecl {
            attrs,
            tag: None,
            name: name.or(tag).unwrap_or_default(),
            variants,
            span,
        })
    }

    fn parse_interface(&mut self, attrs: Vec<Attribute>) -> Result<Item> {
        let span = self.span();
        self.expect(&Token::Interface)?;
        let name = self.expect_ident()?;

        if self.eat(&Token::Semicolon) {
            return Ok(Item::Forward(name, span));
        }

        let base = if self.eat(&Token::Colon) { Some(self.expect_ident()?) } else { None };
        self.expect(&Token::LBrace)?;
        let mut methods = Vec::new();
        while !self.eat(&Token::RBrace) {
            methods.push(self.parse_method()?);
        }
        self.eat(&Token::Semicolon);

        Ok(Item::Interface(InterfaceDecl { attrs, name, base, methods, span }))
    }

    fn parse_method(&mut self) -> Result<MethodDecl> {
        let attrs = self.parse_optional_attributes()?;
        let span = self.span();
        let return_type = self.parse_type()?;
        let name = self.expect_ident()?;
        self.expect(&Token::LParen)?;

        let mut params = Vec::new();
        let void_list = *self.current() == Token::Void
            && matches!(self.tokens.get(self.pos + 1).map(|t| &t.token), Some(Token::RParen));
        if void_list {
            self.advance();
        } else if *self.current() != Token::RParen {
            loop {
                params.push(self.parse_param()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        self.expect(&Token::Semicolon)?;

        Ok(MethodDecl { attrs, return_type, name, params, span })
    }

    fn parse_param(&mut self) -> Result<ParamDecl> {
        let attrs = self.parse_optional_attributes()?;
        let span = self.span();
        let ty = self.parse_type()?;
        let name = self.expect_ident()?;
        if *self.current() == Token::LBracket {
            return Err(TypeLibError::parse(self.span(), format!("array parameter {name} is not supported")));
        }
        Ok(ParamDecl { attrs, ty, name, span })
    }

    fn parse_coclass(&mut self, attrs: Vec<Attribute>) -> Result<Item> {
        let span = self.span();
        self.expect(&Token::Coclass)?;
        let name = self.expect_ident()?;
        self.expect(&Token::LBrace)?;

        let mut interfaces = Vec::new();
        while !self.eat(&Token::RBrace) {
            let member_attrs = self.parse_optional_attributes()?;
            let member_span = self.span();
            // dispinterfaces are listed the same way
            match self.current() {
                Token::Interface => self.advance(),
                Token::Ident(kw) if kw == "dispinterface" => self.advance(),
                _ => return Err(self.error("interface")),
            }
            let member = self.expect_ident()?;
            self.expect(&Token::Semicolon)?;
            interfaces.push(CoclassMember {
                name: member,
                is_default: member_attrs.has(&Attribute::Default),
                is_source: member_attrs.has(&Attribute::Source),
                span: member_span,
            });
        }
        self.eat(&Token::Semicolon);

        Ok(Item::Coclass(CoclassDecl { attrs, name, interfaces, span }))
    }

    fn parse_library(&mut self, attrs: Vec<Attribute>) -> Result<Item> {
        let span = self.span();
        self.expect(&Token::Library)?;
        let name = self.expect_ident()?;
        self.expect(&Token::LBrace)?;

        let mut items = Vec::new();
        while !self.eat(&Token::RBrace) {
            if *self.current() == Token::Eof {
                return Err(self.error("'}'"));
            }
            if let Some(item) = self.parse_item()? {
                items.push(item);
            }
        }
        self.eat(&Token::Semicolon);

        Ok(Item::Library(LibraryDecl { attrs, name, items, span }))
    }

    fn parse_type(&mut self) -> Result<Type> {
        while self.eat(&Token::Const) {}

        let unsigned = if self.eat(&Token::Unsigned) {
            true
        } else {
            self.eat(&Token::Signed);
            false
        };

        let base = match self.current().clone() {
            Token::Void => BaseType::Void,
            Token::Boolean => BaseType::Boolean,
            Token::Byte => BaseType::Byte,
            Token::WChar => BaseType::WChar,
            Token::Char if unsigned => BaseType::UChar,
            Token::Char => BaseType::Char,
            Token::Small if unsigned => BaseType::USmall,
            Token::Small => BaseType::Small,
            Token::Short if unsigned => BaseType::UShort,
            Token::Short => BaseType::Short,
            Token::Long | Token::Int | Token::Int32 if unsigned => BaseType::ULong,
            Token::Long | Token::Int | Token::Int32 => BaseType::Long,
            Token::Hyper | Token::Int64 if unsigned => BaseType::UHyper,
            Token::Hyper | Token::Int64 => BaseType::Hyper,
            Token::Float => BaseType::Float,
            Token::Double => BaseType::Double,
            Token::Struct | Token::Enum => {
                self.advance();
                let name = self.expect_ident()?;
                return self.parse_pointers(Type::Named(name));
            }
            Token::Ident(name) if !unsigned => {
                self.advance();
                return self.parse_pointers(Type::Named(name));
            }
            // bare `unsigned` means unsigned int
            _ if unsigned => return self.parse_pointers(Type::Base(BaseType::ULong)),
            _ => return Err(self.error("type")),
        };
        self.advance();

        // `long int`, `short int`, `unsigned long int`
        if matches!(base, BaseType::Long | BaseType::ULong | BaseType::Short | BaseType::UShort) {
            self.eat(&Token::Int);
        }
        self.parse_pointers(Type::Base(base))
    }

    fn parse_pointers(&mut self, mut ty: Type) -> Result<Type> {
        loop {
            if self.eat(&Token::Star) {
                ty = Type::Pointer(Box::new(ty));
            } else if !self.eat(&Token::Const) {
                return Ok(ty);
            }
        }
    }
}

fn parse_version(text: &str) -> Option<(u16, u16)> {
    let (major, minor) = text.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

fn token_text(token: &Token) -> String {
    match token {
        Token::Ident(s) | Token::Decimal(s) | Token::Uuid(s) => s.clone(),
        Token::Str(s) => format!("{s:?}"),
        Token::Integer(n) => n.to_string(),
        Token::Comma => ",".to_string(),
        Token::Star => "*".to_string(),
        Token::Minus => "-".to_string(),
        Token::LParen => "(".to_string(),
        Token::RParen => ")".to_string(),
        other => format!("{other:?}").to_lowercase(),
    }
}
