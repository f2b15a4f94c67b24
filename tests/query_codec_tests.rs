use portal_client::models::Paginated;
use portal_client::query::{
    FilterExpr, FilterField, FilterOperator, ListQuery, PaginationParams, SortDirection, SortOrder,
    from_wire, offset_to_page, page_to_offset, to_wire,
};

// --- Filter Expressions ---

#[test]
fn test_eq_is_written_bare() {
    assert_eq!(FilterExpr::eq("active").encode(), "active");
    assert_eq!(
        FilterExpr::decode("active", FilterOperator::Eq),
        FilterExpr::eq("active")
    );
}

#[test]
fn test_every_operator_round_trips() {
    for op in FilterOperator::ALL {
        let mut cases = vec![FilterExpr::new(op, ["draft"])];
        if op.is_multi_value() {
            cases.push(FilterExpr::new(op, ["active", "pending"]));
        }
        if op == FilterOperator::Like {
            cases.push(FilterExpr::new(op, ["home page"]));
        }

        for expr in cases {
            let decoded = FilterExpr::decode(&expr.encode(), FilterOperator::Eq);
            assert_eq!(decoded, expr, "round trip of {}", expr.encode());
        }
    }
}

#[test]
fn test_longer_operator_names_win() {
    let not_in = FilterExpr::decode("not_in:a,b", FilterOperator::Eq);
    assert_eq!(not_in.operator, FilterOperator::NotIn);
    assert_eq!(not_in.values, vec!["a", "b"]);

    let lte = FilterExpr::decode("lte:5", FilterOperator::Eq);
    assert_eq!(lte.operator, FilterOperator::Lte);
    assert_eq!(lte.values, vec!["5"]);

    let neq = FilterExpr::decode("neq:x", FilterOperator::Eq);
    assert_eq!(neq.operator, FilterOperator::Neq);
}

#[test]
fn test_unknown_prefix_is_part_of_the_value() {
    let expr = FilterExpr::decode("10:30", FilterOperator::Eq);
    assert_eq!(expr.operator, FilterOperator::Eq);
    assert_eq!(expr.value(), "10:30");

    // An operator name without the delimiter is a plain value.
    let expr = FilterExpr::decode("inactive", FilterOperator::Eq);
    assert_eq!(expr, FilterExpr::eq("inactive"));
}

#[test]
fn test_single_value_operators_keep_commas() {
    let expr = FilterExpr::decode("like:a,b", FilterOperator::Eq);
    assert_eq!(expr.values, vec!["a,b"]);
}

#[test]
fn test_bare_value_uses_field_default_operator() {
    let field = FilterField::new("title", &[FilterOperator::Like, FilterOperator::Eq]);
    assert_eq!(field.default_operator(), FilterOperator::Like);

    let expr = field.decode("home");
    assert_eq!(expr.operator, FilterOperator::Like);
    assert_eq!(expr.values, vec!["home"]);

    let no_ops = FilterField::new("slug", &[]);
    assert_eq!(no_ops.default_operator(), FilterOperator::Eq);
}

#[test]
fn test_empty_expression_clears_key() {
    let mut params = PaginationParams::from_query_str("status=in:a,b&page=2");
    params.set_filter("status", &FilterExpr::new(FilterOperator::In, Vec::<String>::new()));
    assert!(!params.contains_key("status"));

    assert!(FilterExpr::eq("").is_empty());
    assert!(FilterExpr::decode("in:", FilterOperator::Eq).is_empty());
}

#[test]
fn test_operator_names_parse() {
    for op in FilterOperator::ALL {
        assert_eq!(op.as_str().parse::<FilterOperator>(), Ok(op));
    }
    assert!("contains".parse::<FilterOperator>().is_err());
}

// --- Parameter Bag ---

#[test]
fn test_query_string_round_trip_keeps_order() {
    let raw = "status=in:active,pending&price=between:100,500&page=2";
    let params = PaginationParams::from_query_str(raw);

    assert_eq!(params.keys().collect::<Vec<_>>(), vec!["status", "price", "page"]);
    assert_eq!(params.to_query_string(), raw);
    assert_eq!(PaginationParams::from_query_str(&format!("?{}", raw)), params);
}

#[test]
fn test_repeated_keys_accumulate() {
    let params = PaginationParams::from_query_str("tag=a&tag=b&limit=10");
    assert_eq!(params.get_all("tag").unwrap(), ["a", "b"]);
    assert_eq!(params.get("tag"), Some("a"));
    assert_eq!(params.to_query_string(), "tag=a&tag=b&limit=10");
}

#[test]
fn test_reserved_characters_are_encoded() {
    let mut params = PaginationParams::new();
    params.set("search", "a&b=c d");
    params.set("title", "like:50%");

    assert_eq!(params.to_query_string(), "search=a%26b%3Dc+d&title=like:50%25");
    let parsed = PaginationParams::from_query_str(&params.to_query_string());
    assert_eq!(parsed, params);
}

#[test]
fn test_set_keeps_key_position() {
    let mut params = PaginationParams::from_query_str("a=1&b=2");
    params.set("a", "3");
    assert_eq!(params.to_string(), "a=3&b=2");
    assert_eq!(params.remove("a"), Some(vec!["3".to_string()]));
    assert_eq!(params.len(), 1);
}

#[test]
fn test_from_pairs() {
    let params = PaginationParams::from_pairs([("page", "2"), ("limit", "50")]);
    assert_eq!(params.page(), Some(2));
    assert_eq!(params.limit(), Some(50));
}

// --- Sort ---

#[test]
fn test_sort_travels_as_field_plus_direction() {
    let mut params = PaginationParams::new();
    params.set_sort(&SortOrder::desc("created_at"));

    assert_eq!(params.get("sort"), Some("created_at desc"));
    assert_eq!(params.to_query_string(), "sort=created_at+desc");

    let parsed = PaginationParams::from_query_str("sort=created_at+desc");
    assert_eq!(parsed.sort(), Some(SortOrder::desc("created_at")));
}

#[test]
fn test_sort_parse_variants() {
    assert_eq!(SortOrder::parse("name"), Some(SortOrder::asc("name")));
    assert_eq!(SortOrder::parse("name+ASC"), Some(SortOrder::asc("name")));
    assert_eq!(
        SortOrder::parse("name desc").map(|s| s.direction),
        Some(SortDirection::Desc)
    );
    assert_eq!(SortOrder::parse("name sideways"), None);
    assert_eq!(SortOrder::parse(""), None);
}

// --- Page / Offset ---

#[test]
fn test_page_offset_conversion() {
    assert_eq!(page_to_offset(1, 20), 0);
    assert_eq!(page_to_offset(3, 20), 40);
    assert_eq!(page_to_offset(0, 20), 0);
    assert_eq!(offset_to_page(40, 20), 3);
    assert_eq!(offset_to_page(0, 20), 1);
    assert_eq!(offset_to_page(15, 0), 1);
}

#[test]
fn test_huge_offsets_saturate() {
    assert_eq!(offset_to_page(u64::from(u32::MAX) - 1, 1), u32::MAX);
    assert_eq!(offset_to_page(u64::from(u32::MAX), 1), u32::MAX);
    assert_eq!(offset_to_page(1 << 33, 1), u32::MAX);
    assert_eq!(offset_to_page(u64::MAX, 20), u32::MAX);

    let wire = PaginationParams::from_query_str("offset=4294967295&limit=1");
    assert_eq!(from_wire(&wire, 20).page(), Some(u32::MAX));

    let echo = Paginated::<()> {
        data: Vec::new(),
        total: u64::MAX,
        limit: 1,
        offset: u64::MAX,
    };
    assert_eq!(echo.page(), u32::MAX);
    assert_eq!(echo.total_pages(), u32::MAX);
}

#[test]
fn test_to_wire_converts_page_to_offset() {
    let params = PaginationParams::from_query_str("page=3&limit=20");
    assert_eq!(to_wire(&params, 20).to_query_string(), "offset=40&limit=20");

    let first = PaginationParams::from_query_str("page=1&limit=20");
    assert_eq!(to_wire(&first, 20).to_query_string(), "offset=0&limit=20");
}

#[test]
fn test_to_wire_fills_default_limit() {
    let params = PaginationParams::from_query_str("page=2");
    assert_eq!(to_wire(&params, 20).to_query_string(), "offset=20&limit=20");

    let params = PaginationParams::from_query_str("page=2");
    assert_eq!(to_wire(&params, 50).to_query_string(), "offset=50&limit=50");
}

#[test]
fn test_to_wire_passes_other_keys_through() {
    let params = PaginationParams::from_query_str("page=2&status=in:active,pending&search=home");
    assert_eq!(
        to_wire(&params, 20).to_query_string(),
        "status=in:active,pending&search=home&offset=20&limit=20"
    );

    let no_page = PaginationParams::from_query_str("status=active");
    assert_eq!(to_wire(&no_page, 20).to_query_string(), "status=active");

    let limit_only = PaginationParams::from_query_str("limit=5&status=active");
    assert_eq!(to_wire(&limit_only, 20).to_query_string(), "status=active&limit=5");
}

#[test]
fn test_from_wire_restores_page() {
    let wire = PaginationParams::from_query_str("status=active&offset=40&limit=20");
    let params = from_wire(&wire, 20);

    assert_eq!(params.page(), Some(3));
    assert!(!params.contains_key("offset"));
    assert_eq!(params.get("status"), Some("active"));
}

// --- List Query Builder ---

#[test]
fn test_list_query_end_to_end() {
    let query = ListQuery::new()
        .filter("status", FilterOperator::In, ["active", "pending"])
        .search("search", "landing")
        .sort(SortOrder::asc("title"))
        .page(3);

    assert_eq!(
        query.to_query_string(),
        "status=in:active,pending&search=landing&sort=title+asc&offset=40&limit=20"
    );
    assert_eq!(
        query.apply_to_path("/pages"),
        "/pages?status=in:active,pending&search=landing&sort=title+asc&offset=40&limit=20"
    );
}

#[test]
fn test_list_query_empty_search_and_path() {
    let query = ListQuery::new().search("search", "");
    assert!(query.params().is_empty());
    assert_eq!(query.apply_to_path("/pages"), "/pages");

    let query = ListQuery::new().eq("locale", "en");
    assert_eq!(query.apply_to_path("/pages?draft=1"), "/pages?draft=1&locale=en");
}
