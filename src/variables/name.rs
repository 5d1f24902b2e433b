//! Closed enumeration of collection names.

macro_rules! variable_names {
    ($( $(#[$doc:meta])* $variant:ident => $name:literal ),+ $(,)?) => {
        /// Collections addressable from the rule language.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum VariableName {
            $( $(#[$doc])* $variant, )+
        }

        impl VariableName {
            /// Every known collection, in declaration order.
            pub const ALL: &'static [VariableName] = &[$( VariableName::$variant, )+];

            /// Canonical (upper case) name as written in rules.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( VariableName::$variant => $name, )+
                }
            }

            /// Parse a collection name, case-insensitively.
            pub fn from_name(s: &str) -> Option<Self> {
                let upper = s.trim().to_ascii_uppercase();
                match upper.as_str() {
                    $( $name => Some(VariableName::$variant), )+
                    "INBOUND_ERROR" => Some(VariableName::InboundDataError),
                    _ => None,
                }
            }
        }
    };
}

variable_names! {
    /// All arguments (GET and POST).
    Args => "ARGS",
    /// Query string arguments.
    ArgsGet => "ARGS_GET",
    /// Body arguments.
    ArgsPost => "ARGS_POST",
    /// Argument names.
    ArgsNames => "ARGS_NAMES",
    /// Query string argument names.
    ArgsGetNames => "ARGS_GET_NAMES",
    /// Body argument names.
    ArgsPostNames => "ARGS_POST_NAMES",
    /// Combined size of argument names and values.
    ArgsCombinedSize => "ARGS_COMBINED_SIZE",
    /// Request headers, keyed by lower-cased name.
    RequestHeaders => "REQUEST_HEADERS",
    /// Request header names.
    RequestHeadersNames => "REQUEST_HEADERS_NAMES",
    /// Request cookies.
    RequestCookies => "REQUEST_COOKIES",
    /// Request cookie names.
    RequestCookiesNames => "REQUEST_COOKIES_NAMES",
    /// Raw request body.
    RequestBody => "REQUEST_BODY",
    /// Request body length in bytes.
    RequestBodyLength => "REQUEST_BODY_LENGTH",
    /// Request URI including the query string.
    RequestUri => "REQUEST_URI",
    /// Request URI as received.
    RequestUriRaw => "REQUEST_URI_RAW",
    /// Decoded request path.
    RequestFilename => "REQUEST_FILENAME",
    /// Last segment of the request path.
    RequestBasename => "REQUEST_BASENAME",
    /// Query string.
    QueryString => "QUERY_STRING",
    /// HTTP method.
    RequestMethod => "REQUEST_METHOD",
    /// HTTP protocol of the request.
    RequestProtocol => "REQUEST_PROTOCOL",
    /// Full request line.
    RequestLine => "REQUEST_LINE",
    /// Content-Type request header.
    RequestContentType => "REQUEST_CONTENT_TYPE",
    /// Content-Length request header.
    RequestContentLength => "REQUEST_CONTENT_LENGTH",
    /// Request line, headers and body.
    FullRequest => "FULL_REQUEST",
    /// Length of FULL_REQUEST.
    FullRequestLength => "FULL_REQUEST_LENGTH",
    /// Authentication scheme from the Authorization header.
    AuthType => "AUTH_TYPE",
    /// Name of the body processor used in phase 2.
    ReqbodyProcessor => "REQBODY_PROCESSOR",
    /// Set to 1 when the body processor failed.
    ReqbodyError => "REQBODY_ERROR",
    /// Body processor failure message.
    ReqbodyErrorMsg => "REQBODY_ERROR_MSG",
    /// Set to 1 when the request body was truncated at the limit.
    InboundDataError => "INBOUND_DATA_ERROR",
    /// Set to 1 when the response body was truncated at the limit.
    OutboundDataError => "OUTBOUND_DATA_ERROR",
    /// Response headers, keyed by lower-cased name.
    ResponseHeaders => "RESPONSE_HEADERS",
    /// Response header names.
    ResponseHeadersNames => "RESPONSE_HEADERS_NAMES",
    /// Response body.
    ResponseBody => "RESPONSE_BODY",
    /// Response status code.
    ResponseStatus => "RESPONSE_STATUS",
    /// HTTP protocol of the response.
    ResponseProtocol => "RESPONSE_PROTOCOL",
    /// Content-Type response header.
    ResponseContentType => "RESPONSE_CONTENT_TYPE",
    /// Content-Length response header.
    ResponseContentLength => "RESPONSE_CONTENT_LENGTH",
    /// Response status line.
    StatusLine => "STATUS_LINE",
    /// Uploaded file names, keyed by form field.
    Files => "FILES",
    /// Form field names of uploaded files.
    FilesNames => "FILES_NAMES",
    /// Uploaded file sizes, keyed by form field.
    FilesSizes => "FILES_SIZES",
    /// Total size of uploaded files.
    FilesCombinedSize => "FILES_COMBINED_SIZE",
    /// Client IP address.
    RemoteAddr => "REMOTE_ADDR",
    /// Client port.
    RemotePort => "REMOTE_PORT",
    /// Client host name.
    RemoteHost => "REMOTE_HOST",
    /// Authenticated user name.
    RemoteUser => "REMOTE_USER",
    /// Host header value.
    ServerName => "SERVER_NAME",
    /// Server IP address.
    ServerAddr => "SERVER_ADDR",
    /// Server port.
    ServerPort => "SERVER_PORT",
    /// Transaction collection, including the capture registers.
    Tx => "TX",
    /// Persistent session collection.
    Session => "SESSION",
    /// Persistent per-client collection.
    Ip => "IP",
    /// Persistent global collection.
    Global => "GLOBAL",
    /// Persistent per-user collection.
    User => "USER",
    /// Persistent per-resource collection.
    Resource => "RESOURCE",
    /// Variables set with `setenv`.
    Env => "ENV",
    /// Metadata of the rule being evaluated.
    Rule => "RULE",
    /// Value of the last match.
    MatchedVar => "MATCHED_VAR",
    /// Name of the last matched variable.
    MatchedVarName => "MATCHED_VAR_NAME",
    /// All values matched by the current rule.
    MatchedVars => "MATCHED_VARS",
    /// Names of all variables matched by the current rule.
    MatchedVarsNames => "MATCHED_VARS_NAMES",
    /// XML body content (`/*` text nodes, `//@*` attribute values).
    Xml => "XML",
    /// Microseconds since the transaction started.
    Duration => "DURATION",
    /// Transaction start time (unix seconds).
    Timestamp => "TIMESTAMP",
    /// Transaction id.
    UniqueId => "UNIQUE_ID",
    /// Country code written by `@geoLookup`.
    CountryCode => "COUNTRY_CODE",
    /// Highest severity among matched rules (lowest number).
    HighestSeverity => "HIGHEST_SEVERITY",
}

impl VariableName {
    /// Collections stored in the persistence adapter.
    pub fn is_persistent(&self) -> bool {
        matches!(
            self,
            Self::Session | Self::Ip | Self::Global | Self::User | Self::Resource
        )
    }

    /// Collections whose keys compare ASCII case-insensitively.
    pub fn folds_keys(&self) -> bool {
        matches!(
            self,
            Self::RequestHeaders
                | Self::ResponseHeaders
                | Self::Tx
                | Self::Rule
                | Self::Session
                | Self::Ip
                | Self::Global
                | Self::User
                | Self::Resource
        )
    }

    /// Lower-case name, as used in matched-data tags and persistence keys.
    pub fn lower_name(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }
}

impl std::fmt::Display for VariableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
